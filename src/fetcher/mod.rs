mod backend_api;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{CurrencyRates, GapRecord, JobStatusResponse};

pub(crate) use backend_api::{mentions_gateway_busy, mentions_rate_limit};
pub use backend_api::{
    error_from_response,
    parse_retry_after,
    MAX_RETRY_AFTER,
    trade_search_url,
    BackendClient,
    SESSION_HEADER,
};

/// The backend calls the job monitor and batch runner depend on.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn submit_job(&self, bases: &[String], credential: &str) -> Result<String>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse>;

    async fn analyze_base(&self, base: &str, credential: &str) -> Result<GapRecord>;

    async fn currency_rates(&self) -> Result<CurrencyRates>;
}
