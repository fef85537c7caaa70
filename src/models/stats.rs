use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spread of one numeric position across every roll of a modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierStat {
    pub name: String,
    /// prefix, suffix, explicit, implicit, fractured, rune or bonded
    #[serde(rename = "type")]
    pub stat_type: String,
    pub count: u32,
    pub percentage: f64,
    #[serde(default)]
    pub values: Vec<ValueStats>,
}

impl ModifierStat {
    pub fn kind(&self) -> StatKind {
        StatKind::from_type(&self.stat_type)
    }

    /// Value ranges as `min-max (avg)`, one per numeric position.
    pub fn value_summary(&self) -> String {
        self.values
            .iter()
            .map(|v| format!("{}-{} (avg {})", v.min, v.max, v.avg))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Dashboard column a modifier is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatKind {
    Attribute,
    Rune,
    Bonded,
}

impl StatKind {
    pub fn from_type(stat_type: &str) -> Self {
        match stat_type {
            "rune" => StatKind::Rune,
            "bonded" => StatKind::Bonded,
            _ => StatKind::Attribute,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StatKind::Attribute => "Attributes",
            StatKind::Rune => "Runes & Enchants",
            StatKind::Bonded => "Bonded Stats",
        }
    }
}

/// Modifier frequencies for one item category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total_items: u32,
    #[serde(default)]
    pub stats: Vec<ModifierStat>,
}

/// Body of `POST /analyze` and `GET /history/{filename}`, keyed by item category.
pub type StatsReport = BTreeMap<String, CategoryStats>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub filename: String,
    pub name: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct SaveRequest<'a> {
    pub name: &'a str,
    pub query: &'a str,
    pub results: &'a StatsReport,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveResponse {
    pub filename: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

/// The last modifier-stats run, kept so it can be saved later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRun {
    pub query: String,
    pub results: StatsReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stats_report_parses_server_shape() {
        let raw = json!({
            "Bow": {
                "total_items": 40,
                "stats": [
                    {
                        "name": "# to Level of all Projectile Skills",
                        "type": "suffix",
                        "count": 30,
                        "percentage": 75.0,
                        "values": [{"min": 3, "max": 5, "avg": 4.2}]
                    },
                    {"name": "Bonded: #% increased Attack Speed", "type": "bonded", "count": 2, "percentage": 5.0}
                ]
            }
        });
        let report: StatsReport = serde_json::from_value(raw).unwrap();
        let bow = &report["Bow"];
        assert_eq!(bow.total_items, 40);
        assert_eq!(bow.stats[0].kind(), StatKind::Attribute);
        assert_eq!(bow.stats[0].value_summary(), "3-5 (avg 4.2)");
        assert_eq!(bow.stats[1].kind(), StatKind::Bonded);
        assert!(bow.stats[1].values.is_empty());
    }

    #[test]
    fn test_stat_kind_from_type() {
        assert_eq!(StatKind::from_type("rune"), StatKind::Rune);
        assert_eq!(StatKind::from_type("bonded"), StatKind::Bonded);
        for other in ["prefix", "suffix", "implicit", "fractured", "explicit"] {
            assert_eq!(StatKind::from_type(other), StatKind::Attribute);
        }
    }

    #[test]
    fn test_save_request_uses_server_field_names() {
        let results = StatsReport::new();
        let body = serde_json::to_value(SaveRequest {
            name: "Mirror bows",
            query: "{}",
            results: &results,
        })
        .unwrap();
        assert_eq!(body, json!({"name": "Mirror bows", "query": "{}", "results": {}}));
    }
}
