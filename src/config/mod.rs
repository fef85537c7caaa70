use clap::Args;
use std::time::Duration;

use crate::storage::DEFAULT_DATABASE_URL;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_LEAGUE: &str = "Fate of the Vaal";

/// Connection settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Base URL of the analysis backend
    #[arg(long, env = "POE2_TRENDS_API", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// SQLite database holding the local settings and caches
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    pub database_url: String,

    /// League used for trade links
    #[arg(long, env = "POE2_LEAGUE", default_value = DEFAULT_LEAGUE, global = true)]
    pub league: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    /// Pause between two items
    pub item_delay: Duration,
    /// Wait after a 429 that carries no Retry-After
    pub rate_limit_wait: Duration,
    /// Wait after a 502 that carries no Retry-After
    pub gateway_wait: Duration,
    /// Throttle waits allowed for one item before it is abandoned
    pub max_waits_per_item: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            item_delay: Duration::from_secs(2),
            rate_limit_wait: Duration::from_secs(60),
            gateway_wait: Duration::from_secs(30),
            max_waits_per_item: 5,
        }
    }
}
