//! Scripted backend for exercising the job monitor and batch runner.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::AnalysisBackend;
use crate::errors::{Result, TrendsError};
use crate::models::{CurrencyRates, GapRecord, JobStatus, JobStatusResponse};

#[derive(Default)]
pub struct ScriptedBackend {
    pub submit_script: Mutex<VecDeque<Result<String>>>,
    pub submit_calls: Mutex<Vec<(Vec<String>, String)>>,
    pub status_script: Mutex<VecDeque<Result<JobStatusResponse>>>,
    pub status_calls: AtomicUsize,
    pub status_delay: Mutex<Option<Duration>>,
    pub analyze_script: Mutex<VecDeque<Result<GapRecord>>>,
    pub analyze_calls: Mutex<Vec<(String, Instant)>>,
    pub analyze_delay: Mutex<Option<Duration>>,
    pub rates_script: Mutex<VecDeque<Result<CurrencyRates>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submit(&self, result: Result<String>) {
        self.submit_script.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: Result<JobStatusResponse>) {
        self.status_script.lock().unwrap().push_back(result);
    }

    pub fn push_analyze(&self, result: Result<GapRecord>) {
        self.analyze_script.lock().unwrap().push_back(result);
    }

    pub fn push_rates(&self, result: Result<CurrencyRates>) {
        self.rates_script.lock().unwrap().push_back(result);
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_analyze_delay(&self, delay: Duration) {
        *self.analyze_delay.lock().unwrap() = Some(delay);
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn submit_call_count(&self) -> usize {
        self.submit_calls.lock().unwrap().len()
    }

    pub fn analyzed_keys(&self) -> Vec<String> {
        self.analyze_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn analyze_times(&self) -> Vec<Instant> {
        self.analyze_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }
}

pub fn status(value: serde_json::Value) -> JobStatusResponse {
    serde_json::from_value(value).unwrap()
}

pub fn running() -> JobStatusResponse {
    JobStatusResponse {
        status: JobStatus::Running,
        progress: 0,
        total: 0,
        current_item: None,
        results: Vec::new(),
        error: None,
    }
}

pub fn gap(base_type: &str, gap_chaos: f64) -> GapRecord {
    GapRecord {
        base_type: base_type.to_string(),
        normal_avg_chaos: 10.0,
        crafting_avg_chaos: 0.0,
        magic_avg_chaos: 10.0 + gap_chaos,
        gap_chaos,
        search_id: None,
        magic_search_id: None,
    }
}

pub fn rate_limited(seconds: Option<u64>) -> TrendsError {
    TrendsError::RateLimitError {
        message: "Too Many Requests".to_string(),
        retry_after: seconds.map(Duration::from_secs),
    }
}

pub fn gateway_busy(seconds: Option<u64>) -> TrendsError {
    TrendsError::GatewayBusy {
        message: "Bad Gateway".to_string(),
        retry_after: seconds.map(Duration::from_secs),
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn submit_job(&self, bases: &[String], credential: &str) -> Result<String> {
        self.submit_calls
            .lock()
            .unwrap()
            .push((bases.to_vec(), credential.to_string()));
        let next = self.submit_script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("job-1".to_string()))
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.status_script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(running()))
    }

    async fn analyze_base(&self, base: &str, _credential: &str) -> Result<GapRecord> {
        self.analyze_calls
            .lock()
            .unwrap()
            .push((base.to_string(), Instant::now()));
        let delay = *self.analyze_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.analyze_script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(gap(base, 1.0)))
    }

    async fn currency_rates(&self) -> Result<CurrencyRates> {
        let next = self.rates_script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(TrendsError::NetworkError("no rates scripted".to_string())))
    }
}
