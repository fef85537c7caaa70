mod influence;
mod modifier_stats;

pub use influence::{summarize, BucketRow, DistributionSummary, InfluenceMetric};
pub use modifier_stats::{pick_category, StatColumns, DEFAULT_CATEGORY};
