/// Records that occupy one slot per key in a displayed list.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Merges `incoming` into `current`.
///
/// A record whose key is already present replaces that entry where it sits;
/// a record with a new key goes to the front. Merging the same batch twice
/// gives the same list as merging it once.
pub fn merge<R: Keyed + Clone>(current: &[R], incoming: &[R]) -> Vec<R> {
    let mut merged = current.to_vec();
    for record in incoming {
        match merged.iter().position(|r| r.key() == record.key()) {
            Some(index) => merged[index] = record.clone(),
            None => merged.insert(0, record.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        key: String,
        value: i32,
    }

    impl Keyed for Row {
        fn key(&self) -> &str {
            &self.key
        }
    }

    fn row(key: &str, value: i32) -> Row {
        Row {
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn test_existing_key_replaced_in_place() {
        let current = vec![row("a", 1), row("b", 2), row("c", 3)];
        let merged = merge(&current, &[row("b", 20)]);
        assert_eq!(merged, vec![row("a", 1), row("b", 20), row("c", 3)]);
    }

    #[test]
    fn test_new_key_prepended() {
        let current = vec![row("a", 1)];
        let merged = merge(&current, &[row("z", 9), row("y", 8)]);
        assert_eq!(merged, vec![row("y", 8), row("z", 9), row("a", 1)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let current = vec![row("a", 1), row("b", 2)];
        let batch = vec![row("b", 5), row("n", 7), row("n", 8), row("a", 0)];
        let once = merge(&current, &batch);
        let twice = merge(&once, &batch);
        assert_eq!(once, twice);
        assert_eq!(once.iter().filter(|r| r.key == "n").count(), 1);
    }

    #[test]
    fn test_merge_empty_batch() {
        let current = vec![row("a", 1)];
        assert_eq!(merge(&current, &[]), current);
    }
}
