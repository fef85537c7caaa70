use serde::{Deserialize, Serialize};

use super::analysis::{validate_records, GapRecord};
use crate::jobs::merge::merge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Body of `GET /api/jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub current_item: Option<String>,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub progress: u32,
    pub total: u32,
    pub current_item: Option<String>,
    pub error: Option<String>,
    pub results: Vec<GapRecord>,
}

/// What one status response changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub accepted: Vec<GapRecord>,
    pub dropped: usize,
}

impl Job {
    pub fn new(id: String, total: usize) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            total: total as u32,
            current_item: None,
            error: None,
            results: Vec::new(),
        }
    }

    pub fn apply(&mut self, response: JobStatusResponse) -> JobUpdate {
        self.status = response.status;
        self.progress = response.progress;
        // Some responses omit the total; keep the submitted count then.
        if response.total > 0 {
            self.total = response.total;
        }
        self.current_item = response.current_item;
        if response.error.is_some() {
            self.error = response.error;
        }

        let (accepted, dropped) = validate_records(&response.results);
        self.results = merge(&self.results, &accepted);
        JobUpdate { accepted, dropped }
    }

    pub fn progress_label(&self) -> String {
        format!("{}/{}", self.progress, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_response_defaults() {
        let response: JobStatusResponse = serde_json::from_value(json!({
            "status": "running",
            "progress": 1,
            "total": 2,
            "current_item": "Item B"
        }))
        .unwrap();
        assert_eq!(response.status, JobStatus::Running);
        assert!(response.results.is_empty());
        assert!(!response.status.is_terminal());
    }

    #[test]
    fn test_job_apply_updates_progress_and_results() {
        let mut job = Job::new("j1".to_string(), 2);
        assert_eq!(job.progress_label(), "0/2");

        let update = job.apply(
            serde_json::from_value(json!({
                "status": "running",
                "progress": 1,
                "total": 2,
                "current_item": "Item B",
                "results": [{"base_type": "Item A", "gap_chaos": 10}, {"oops": true}]
            }))
            .unwrap(),
        );
        assert_eq!(job.progress_label(), "1/2");
        assert_eq!(job.current_item.as_deref(), Some("Item B"));
        assert_eq!(update.accepted.len(), 1);
        assert_eq!(update.dropped, 1);
        assert_eq!(job.results.len(), 1);
    }

    #[test]
    fn test_job_apply_keeps_total_when_missing() {
        let mut job = Job::new("j1".to_string(), 3);
        job.apply(serde_json::from_value(json!({"status": "pending"})).unwrap());
        assert_eq!(job.total, 3);
    }
}
