use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AnalysisBackend;
use crate::errors::{Result, TrendsError};
use crate::models::{
    AnalysisRecord, CurrencyRates, CustomCategory, DistributionRecord, ExclusionRule, GapRecord,
    HistoryEntry, JobStatusResponse, NewCustomCategory, NewExclusion, SaveRequest, SaveResponse,
    StatsReport, SubmitResponse,
};

/// Header carrying the POESESSID credential on job submission calls.
pub const SESSION_HEADER: &str = "X-POESESSID";

const TRADE_SEARCH_BASE: &str = "https://www.pathofexile.com/trade2/search/poe2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Longest server-requested wait honoured before retrying.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize)]
struct BasesRequest<'a> {
    bases: &'a [String],
}

#[derive(Debug, Serialize)]
struct DistributionRequest<'a> {
    base_type: &'a str,
}

#[derive(Debug, Serialize)]
struct StatsRequest<'a> {
    query_text: &'a str,
    league: &'a str,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

pub struct BackendClient {
    client: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            TrendsError::ValidationError(format!("Invalid backend URL {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TrendsError::ValidationError(format!(
                "Backend URL {} cannot carry a path",
                base_url
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("poe2-trends/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        tracing::debug!("Backend response status: {}", status);

        if !status.is_success() {
            return Err(error_from_response(status, &headers, &body, fallback));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            tracing::warn!("Failed to parse backend response: {}", e);
            TrendsError::ParseError(format!(
                "Failed to parse response: {}. Response body: {}",
                e, body
            ))
        })
    }

    async fn send_empty(&self, request: RequestBuilder, fallback: &str) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &headers, &body, fallback))
    }

    pub async fn submit_batch_job(&self, bases: &[String], credential: &str) -> Result<String> {
        let url = self.endpoint(&["api", "analyze", "batch"]);
        tracing::info!("Submitting batch job for {} bases", bases.len());

        let response: SubmitResponse = self
            .send_json(
                self.client
                    .post(url)
                    .header(SESSION_HEADER, credential)
                    .json(&BasesRequest { bases }),
                "Failed to start analysis",
            )
            .await?;
        Ok(response.job_id)
    }

    pub async fn start_distribution_analysis(&self, base_type: &str) -> Result<String> {
        let url = self.endpoint(&["api", "analyze", "distribution"]);
        let response: SubmitResponse = self
            .send_json(
                self.client
                    .post(url)
                    .json(&DistributionRequest { base_type }),
                "Failed to start analysis",
            )
            .await?;
        Ok(response.job_id)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusResponse> {
        let url = self.endpoint(&["api", "jobs", job_id]);
        self.send_json(self.client.get(url), "Failed to get job status")
            .await
    }

    pub async fn analyze_batch_price(&self, base: &str, credential: &str) -> Result<GapRecord> {
        let url = self.endpoint(&["api", "analyze", "batch-price"]);
        let bases = [base.to_string()];
        let fallback = format!("Analysis failed for {}", base);

        let records: Vec<serde_json::Value> = self
            .send_json(
                self.client
                    .post(url)
                    .header(SESSION_HEADER, credential)
                    .json(&BasesRequest { bases: &bases }),
                &fallback,
            )
            .await?;

        match records.first() {
            Some(raw) => GapRecord::from_value(raw),
            None => Err(TrendsError::ValidationError(format!(
                "No result returned for {}",
                base
            ))),
        }
    }

    pub async fn exclusions(&self) -> Result<Vec<ExclusionRule>> {
        let url = self.endpoint(&["api", "db", "exclusions"]);
        let envelope: DataEnvelope<Vec<ExclusionRule>> = self
            .send_json(self.client.get(url), "Failed to fetch exclusions")
            .await?;
        Ok(envelope.data)
    }

    pub async fn add_exclusion(&self, exclusion: &NewExclusion) -> Result<ExclusionRule> {
        if !exclusion.has_criteria() {
            return Err(TrendsError::ValidationError(
                "An exclusion needs a pattern, tier or type".to_string(),
            ));
        }
        let url = self.endpoint(&["api", "db", "exclusions"]);
        let envelope: DataEnvelope<ExclusionRule> = self
            .send_json(self.client.post(url).json(exclusion), "Failed to add exclusion")
            .await?;
        Ok(envelope.data)
    }

    pub async fn update_exclusion(
        &self,
        id: &str,
        exclusion: &NewExclusion,
    ) -> Result<ExclusionRule> {
        let url = self.endpoint(&["api", "db", "exclusions", id]);
        let envelope: DataEnvelope<ExclusionRule> = self
            .send_json(self.client.put(url).json(exclusion), "Failed to update exclusion")
            .await?;
        Ok(envelope.data)
    }

    pub async fn remove_exclusion(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["api", "db", "exclusions", id]);
        self.send_empty(self.client.delete(url), "Failed to remove exclusion")
            .await
    }

    pub async fn custom_categories(&self) -> Result<Vec<CustomCategory>> {
        let url = self.endpoint(&["api", "db", "custom-categories"]);
        let envelope: DataEnvelope<Vec<CustomCategory>> = self
            .send_json(self.client.get(url), "Failed to fetch custom categories")
            .await?;
        Ok(envelope.data)
    }

    pub async fn add_custom_category(&self, category: &NewCustomCategory) -> Result<CustomCategory> {
        let url = self.endpoint(&["api", "db", "custom-categories"]);
        let envelope: DataEnvelope<CustomCategory> = self
            .send_json(
                self.client.post(url).json(category),
                "Failed to add custom category",
            )
            .await?;
        Ok(envelope.data)
    }

    pub async fn remove_custom_category(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["api", "db", "custom-categories", id]);
        self.send_empty(self.client.delete(url), "Failed to remove custom category")
            .await
    }

    pub async fn analyses(&self, base_type: Option<&str>, limit: u32) -> Result<Vec<AnalysisRecord>> {
        let url = self.endpoint(&["api", "db", "analyses"]);
        let envelope: DataEnvelope<Vec<AnalysisRecord>> = self
            .send_json(
                self.client.get(url).query(&filter_query(base_type, Some(limit))),
                "Failed to fetch analyses",
            )
            .await?;
        Ok(envelope.data)
    }

    pub async fn analysis(&self, id: &str) -> Result<AnalysisRecord> {
        let url = self.endpoint(&["api", "db", "analyses", id]);
        let envelope: DataEnvelope<AnalysisRecord> = self
            .send_json(self.client.get(url), "Failed to fetch analysis")
            .await?;
        Ok(envelope.data)
    }

    /// Latest stored analysis per base type, optionally for one base only.
    pub async fn latest_analyses(
        &self,
        base_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AnalysisRecord>> {
        let url = self.endpoint(&["api", "db", "latest-analyses"]);
        let envelope: DataEnvelope<Vec<AnalysisRecord>> = self
            .send_json(
                self.client.get(url).query(&filter_query(base_type, Some(limit))),
                "Failed to fetch latest analyses",
            )
            .await?;
        Ok(envelope.data)
    }

    pub async fn distribution_results(&self, base_type: &str) -> Result<Vec<DistributionRecord>> {
        let url = self.endpoint(&["api", "db", "item-analyses"]);
        let envelope: DataEnvelope<Vec<DistributionRecord>> = self
            .send_json(
                self.client.get(url).query(&filter_query(Some(base_type), None)),
                "Failed to fetch analysis results",
            )
            .await?;
        Ok(envelope.data)
    }

    pub async fn item_catalog(&self) -> Result<serde_json::Value> {
        let url = self.endpoint(&["api", "items"]);
        self.send_json(self.client.get(url), "Failed to fetch items")
            .await
    }

    pub async fn fetch_currency_rates(&self) -> Result<CurrencyRates> {
        let url = self.endpoint(&["api", "currency", "rates"]);
        self.send_json(self.client.get(url), "Failed to fetch currency rates")
            .await
    }

    /// Runs a pasted trade query and returns modifier frequencies per item category.
    ///
    /// The server fetches at most 100 listings, so this can take a while.
    pub async fn analyze_query(&self, query_text: &str, league: &str) -> Result<StatsReport> {
        check_trade_query(query_text)?;
        let url = self.endpoint(&["analyze"]);
        tracing::info!("Analyzing trade query on {}", league);
        self.send_json(
            self.client
                .post(url)
                .json(&StatsRequest { query_text, league }),
            "Analysis failed",
        )
        .await
    }

    /// Saved modifier-stats runs, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let url = self.endpoint(&["history"]);
        self.send_json(self.client.get(url), "Failed to load history")
            .await
    }

    pub async fn history_entry(&self, filename: &str) -> Result<StatsReport> {
        check_history_filename(filename)?;
        let url = self.endpoint(&["history", filename]);
        self.send_json(self.client.get(url), "File not found")
            .await
    }

    pub async fn save_stats(
        &self,
        name: &str,
        query: &str,
        results: &StatsReport,
    ) -> Result<SaveResponse> {
        if name.trim().is_empty() || results.is_empty() {
            return Err(TrendsError::ValidationError(
                "Missing name or results".to_string(),
            ));
        }
        let url = self.endpoint(&["save"]);
        self.send_json(
            self.client.post(url).json(&SaveRequest {
                name,
                query,
                results,
            }),
            "Failed to save",
        )
        .await
    }
}

/// Rejects input the server would refuse before spending a request on it.
fn check_trade_query(query_text: &str) -> Result<()> {
    if query_text.trim().is_empty() {
        return Err(TrendsError::ValidationError(
            "Paste a trade query first".to_string(),
        ));
    }
    serde_json::from_str::<serde_json::Value>(query_text).map_err(|_| {
        TrendsError::ValidationError(
            "Invalid JSON format. Please paste a valid PoE Trade query JSON.".to_string(),
        )
    })?;
    Ok(())
}

fn check_history_filename(filename: &str) -> Result<()> {
    if !filename.ends_with(".json") || filename.contains('/') || filename.contains('\\') {
        return Err(TrendsError::ValidationError("Invalid filename".to_string()));
    }
    Ok(())
}

#[async_trait]
impl AnalysisBackend for BackendClient {
    async fn submit_job(&self, bases: &[String], credential: &str) -> Result<String> {
        self.submit_batch_job(bases, credential).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse> {
        self.get_job_status(job_id).await
    }

    async fn analyze_base(&self, base: &str, credential: &str) -> Result<GapRecord> {
        self.analyze_batch_price(base, credential).await
    }

    async fn currency_rates(&self) -> Result<CurrencyRates> {
        self.fetch_currency_rates().await
    }
}

fn filter_query(base_type: Option<&str>, limit: Option<u32>) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(base_type) = base_type {
        params.push(("base_type", base_type.to_string()));
    }
    if let Some(limit) = limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

/// Reads a `Retry-After` header given in seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<f64>().ok()?;
    if seconds.is_nan() || seconds < 0.0 {
        return None;
    }
    // Huge or infinite values saturate instead of overflowing Duration
    Some(
        Duration::try_from_secs_f64(seconds)
            .map_or(MAX_RETRY_AFTER, |d| d.min(MAX_RETRY_AFTER)),
    )
}

/// True when `code` appears as a standalone number, so `4.502` or `15020` do not count.
fn mentions_code(message: &str, code: &str) -> bool {
    let is_numeric = |c: char| c.is_ascii_digit() || c == '.';
    message.match_indices(code).any(|(start, _)| {
        let before = message[..start].chars().next_back();
        let after = message[start + code.len()..].chars().next();
        !before.is_some_and(is_numeric) && !after.is_some_and(is_numeric)
    })
}

pub(crate) fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    mentions_code(&lower, "429")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
}

pub(crate) fn mentions_gateway_busy(message: &str) -> bool {
    let lower = message.to_lowercase();
    mentions_code(&lower, "502") || lower.contains("bad gateway")
}

/// Maps a non-success response to an error, keeping the server's message.
pub fn error_from_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    fallback: &str,
) -> TrendsError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());
    let retry_after = parse_retry_after(headers);

    match status {
        StatusCode::NOT_FOUND => TrendsError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => TrendsError::RateLimitError {
            message,
            retry_after,
        },
        StatusCode::BAD_GATEWAY => TrendsError::GatewayBusy {
            message,
            retry_after,
        },
        // The backend sometimes wraps upstream throttling in a generic error
        _ if mentions_rate_limit(&message) => TrendsError::RateLimitError {
            message,
            retry_after,
        },
        _ if mentions_gateway_busy(&message) => TrendsError::GatewayBusy {
            message,
            retry_after,
        },
        _ => TrendsError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

/// Link to the public trade site for a stored search.
pub fn trade_search_url(league: &str, search_id: &str) -> Result<Url> {
    let mut url = Url::parse(TRADE_SEARCH_BASE)
        .map_err(|e| TrendsError::ValidationError(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| TrendsError::ValidationError("invalid trade site URL".to_string()))?
        .extend([league, search_id]);
    Ok(url)
}
