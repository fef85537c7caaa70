pub mod currency_rates;
pub mod item_catalog;
pub mod result_cache;
pub mod stats_cache;

pub use currency_rates::{get_rates, refresh_rates};
pub use item_catalog::{load_catalog, parse_catalog};
pub use result_cache::{clear_results, load_results, save_results};
pub use stats_cache::{load_last_stats, save_last_stats};
