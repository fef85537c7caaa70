pub mod analyzer;
pub mod config;
pub mod data;
pub mod errors;
pub mod fetcher;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod selection;
pub mod storage;

pub use errors::{Result, TrendsError};
