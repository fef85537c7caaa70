pub mod analysis;
pub mod catalog;
pub mod currency;
pub mod job;
pub mod preferences;
pub mod stats;

pub use analysis::{
    AnalysisRecord,
    DistributionRecord,
    GapRecord,
    ModifierRecord,
    PriceBucket,
    retain_selected,
};

pub use catalog::ItemEntry;

pub use currency::CurrencyRates;

pub use job::{
    Job,
    JobStatus,
    JobStatusResponse,
    JobUpdate,
    SubmitResponse,
};

pub use preferences::{
    CustomCategory,
    ExclusionRule,
    NewCustomCategory,
    NewExclusion,
};

pub use stats::{
    CategoryStats,
    HistoryEntry,
    ModifierStat,
    SaveRequest,
    SaveResponse,
    StatKind,
    StatsReport,
    StatsRun,
    ValueStats,
};
