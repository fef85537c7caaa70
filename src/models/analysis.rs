use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{Result, TrendsError};
use crate::jobs::merge::Keyed;

/// Price gap between normal and magic listings of one base type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapRecord {
    pub base_type: String,
    #[serde(default)]
    pub normal_avg_chaos: f64,
    #[serde(default)]
    pub crafting_avg_chaos: f64,
    #[serde(default)]
    pub magic_avg_chaos: f64,
    pub gap_chaos: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic_search_id: Option<String>,
}

impl GapRecord {
    /// Validates a raw result record from the backend.
    ///
    /// A record needs a string `base_type` and a numeric `gap_chaos`.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self> {
        if !raw.get("base_type").is_some_and(|v| v.is_string()) {
            return Err(TrendsError::ValidationError(
                "result record is missing base_type".to_string(),
            ));
        }
        if !raw.get("gap_chaos").is_some_and(|v| v.is_number()) {
            return Err(TrendsError::ValidationError(format!(
                "result record for {} has no numeric gap_chaos",
                raw["base_type"].as_str().unwrap_or_default()
            )));
        }
        Ok(serde_json::from_value(raw.clone())?)
    }

    pub fn roi_percent(&self) -> f64 {
        if self.normal_avg_chaos > 0.0 {
            self.gap_chaos / self.normal_avg_chaos * 100.0
        } else {
            0.0
        }
    }
}

impl Keyed for GapRecord {
    fn key(&self) -> &str {
        &self.base_type
    }
}

/// Splits a batch of raw records into validated records and a dropped count.
pub fn validate_records(raw: &[serde_json::Value]) -> (Vec<GapRecord>, usize) {
    let mut accepted = Vec::with_capacity(raw.len());
    let mut dropped = 0;
    for value in raw {
        match GapRecord::from_value(value) {
            Ok(record) => accepted.push(record),
            Err(e) => {
                tracing::warn!("Dropping invalid result record: {}", e);
                dropped += 1;
            }
        }
    }
    (accepted, dropped)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierRecord {
    pub name: String,
    pub tier: String,
    pub mod_type: String,
    pub rarity: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub price_chaos: Option<f64>,
    #[serde(default)]
    pub magnitude_min: Option<f64>,
    #[serde(default)]
    pub magnitude_max: Option<f64>,
    #[serde(default)]
    pub mod_group: Option<String>,
}

/// A stored analysis run as returned by the backend database routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub base_type: String,
    pub created_at: NaiveDateTime,
    pub normal_avg_chaos: f64,
    #[serde(default)]
    pub crafting_avg_chaos: f64,
    pub magic_avg_chaos: f64,
    pub gap_chaos: f64,
    #[serde(default)]
    pub search_id: Option<String>,
    #[serde(default)]
    pub magic_search_id: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<ModifierRecord>,
}

impl AnalysisRecord {
    pub fn normal_modifiers(&self) -> impl Iterator<Item = &ModifierRecord> {
        self.modifiers.iter().filter(|m| {
            let rarity = m.rarity.to_lowercase();
            rarity == "normal" || rarity == "unknown"
        })
    }

    pub fn magic_modifiers(&self) -> impl Iterator<Item = &ModifierRecord> {
        self.modifiers
            .iter()
            .filter(|m| m.rarity.eq_ignore_ascii_case("magic"))
    }

    pub fn to_gap_record(&self) -> GapRecord {
        GapRecord {
            base_type: self.base_type.clone(),
            normal_avg_chaos: self.normal_avg_chaos,
            crafting_avg_chaos: self.crafting_avg_chaos,
            magic_avg_chaos: self.magic_avg_chaos,
            gap_chaos: self.gap_chaos,
            search_id: self.search_id.clone(),
            magic_search_id: self.magic_search_id.clone(),
        }
    }
}

impl Keyed for AnalysisRecord {
    fn key(&self) -> &str {
        &self.base_type
    }
}

/// Keeps only the records whose key is in `names`.
pub fn retain_selected<'a, R: Keyed>(records: &'a [R], names: &[String]) -> Vec<&'a R> {
    records
        .iter()
        .filter(|r| names.iter().any(|n| n == r.key()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBucket {
    pub price_range: String,
    pub min_price: f64,
    #[serde(default)]
    pub max_price: Option<f64>,
    pub count: u32,
    pub avg_price: f64,
    #[serde(default)]
    pub attributes: HashMap<String, u32>,
}

/// Price distribution for one base type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub base_type: String,
    #[serde(default)]
    pub buckets: Vec<PriceBucket>,
}
