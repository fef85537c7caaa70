use crate::errors::Result;
use crate::models::StatsRun;
use crate::storage::{KeyValueStore, VersionedCache};

const LAST_STATS: VersionedCache<StatsRun> = VersionedCache::new("poe_modifier_stats", "v1");

pub async fn load_last_stats(store: &dyn KeyValueStore) -> Result<Option<StatsRun>> {
    LAST_STATS.load(store).await
}

/// Replaces the kept run; only the most recent one is saved.
pub async fn save_last_stats(store: &dyn KeyValueStore, run: &StatsRun) -> Result<()> {
    LAST_STATS.save(store, run).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryStats, StatsReport};
    use crate::storage::MemoryStore;

    fn run(query: &str, category: &str) -> StatsRun {
        let mut results = StatsReport::new();
        results.insert(
            category.to_string(),
            CategoryStats {
                total_items: 3,
                stats: Vec::new(),
            },
        );
        StatsRun {
            query: query.to_string(),
            results,
        }
    }

    #[tokio::test]
    async fn test_last_stats_run_is_replaced() {
        let store = MemoryStore::new();
        assert_eq!(load_last_stats(&store).await.unwrap(), None);

        save_last_stats(&store, &run("{}", "Bow")).await.unwrap();
        let second = run(r#"{"query": {}}"#, "Wand");
        save_last_stats(&store, &second).await.unwrap();

        assert_eq!(load_last_stats(&store).await.unwrap(), Some(second));
    }
}
