use crate::models::{CategoryStats, ModifierStat, StatKind, StatsReport};

/// Category shown when none is asked for and the report has one.
pub const DEFAULT_CATEGORY: &str = "Bow";

/// One category's modifiers split into dashboard columns.
#[derive(Debug, Default, PartialEq)]
pub struct StatColumns<'a> {
    pub attributes: Vec<&'a ModifierStat>,
    pub runes: Vec<&'a ModifierStat>,
    pub bonded: Vec<&'a ModifierStat>,
}

impl<'a> StatColumns<'a> {
    /// Splits `category` by modifier kind, keeping only names containing `filter`
    /// (case-insensitive). Server order (most frequent first) is kept in each column.
    pub fn group(category: &'a CategoryStats, filter: &str) -> Self {
        let needle = filter.to_lowercase();
        let mut columns = StatColumns::default();

        for stat in &category.stats {
            if !stat.name.to_lowercase().contains(&needle) {
                continue;
            }
            match stat.kind() {
                StatKind::Attribute => columns.attributes.push(stat),
                StatKind::Rune => columns.runes.push(stat),
                StatKind::Bonded => columns.bonded.push(stat),
            }
        }
        columns
    }

    /// Non-empty columns in display order.
    pub fn visible(&self) -> Vec<(StatKind, &[&'a ModifierStat])> {
        [
            (StatKind::Attribute, self.attributes.as_slice()),
            (StatKind::Rune, self.runes.as_slice()),
            (StatKind::Bonded, self.bonded.as_slice()),
        ]
        .into_iter()
        .filter(|(_, stats)| !stats.is_empty())
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.runes.is_empty() && self.bonded.is_empty()
    }
}

/// Picks the category to show: the requested one, else `Bow`, else the first.
pub fn pick_category<'a>(
    report: &'a StatsReport,
    requested: Option<&str>,
) -> Option<(&'a str, &'a CategoryStats)> {
    if let Some(name) = requested {
        return report
            .get_key_value(name)
            .or_else(|| {
                report
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
            })
            .map(|(key, stats)| (key.as_str(), stats));
    }

    report
        .get_key_value(DEFAULT_CATEGORY)
        .or_else(|| report.iter().next())
        .map(|(key, stats)| (key.as_str(), stats))
}
