use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::models::PriceBucket;

// Attributes whose frequency moves by less than this are noise
const MIN_FREQUENCY_DIFF: f64 = 0.05;
// Buckets compared at each end of the price range
const EDGE_BUCKETS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketRow {
    pub range: String,
    pub count: u32,
    pub avg_price: f64,
}

/// How much more often an attribute shows up on expensive items than on
/// cheap ones. All values are whole percents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfluenceMetric {
    pub attribute: String,
    pub diff: i64,
    pub top_freq: i64,
    pub bottom_freq: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub buckets: Vec<BucketRow>,
    pub influence: Vec<InfluenceMetric>,
}

struct EdgeStats {
    total: u32,
    attributes: HashMap<String, u32>,
}

impl EdgeStats {
    fn collect<'a>(buckets: impl Iterator<Item = &'a PriceBucket>) -> Self {
        let mut stats = EdgeStats {
            total: 0,
            attributes: HashMap::new(),
        };
        for bucket in buckets {
            stats.total += bucket.count;
            for (attribute, count) in &bucket.attributes {
                *stats.attributes.entry(attribute.clone()).or_default() += count;
            }
        }
        stats
    }

    fn frequency(&self, attribute: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.attributes.get(attribute).copied().unwrap_or(0)) / f64::from(self.total)
    }
}

// Halves round up, also for negative values
fn percent(fraction: f64) -> i64 {
    (fraction * 100.0 + 0.5).floor() as i64
}

/// Sorts buckets by price and scores attributes by how they split the
/// cheapest buckets from the most expensive ones.
///
/// With fewer than four buckets the two ends overlap.
pub fn summarize(buckets: &[PriceBucket]) -> DistributionSummary {
    let mut sorted: Vec<&PriceBucket> = buckets.iter().collect();
    sorted.sort_by(|a, b| a.min_price.total_cmp(&b.min_price));

    let rows = sorted
        .iter()
        .map(|b| BucketRow {
            range: b.price_range.clone(),
            count: b.count,
            avg_price: b.avg_price,
        })
        .collect();

    let top = EdgeStats::collect(sorted.iter().rev().take(EDGE_BUCKETS).copied());
    let bottom = EdgeStats::collect(sorted.iter().take(EDGE_BUCKETS).copied());

    let attributes: BTreeSet<&String> = top
        .attributes
        .keys()
        .chain(bottom.attributes.keys())
        .collect();

    let mut influence: Vec<InfluenceMetric> = attributes
        .into_iter()
        .filter_map(|attribute| {
            let top_freq = top.frequency(attribute);
            let bottom_freq = bottom.frequency(attribute);
            let diff = top_freq - bottom_freq;
            (diff.abs() > MIN_FREQUENCY_DIFF).then(|| InfluenceMetric {
                attribute: attribute.clone(),
                diff: percent(diff),
                top_freq: percent(top_freq),
                bottom_freq: percent(bottom_freq),
            })
        })
        .collect();
    influence.sort_by_key(|m| std::cmp::Reverse(m.diff.abs()));

    DistributionSummary {
        buckets: rows,
        influence,
    }
}
