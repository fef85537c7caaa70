use crate::errors::{Result, TrendsError};
use crate::fetcher::AnalysisBackend;
use crate::models::Job;
use crate::storage::CredentialStore;

/// Starts a server-side analysis of `selection`.
///
/// An empty selection or a missing POESESSID fails before any request is
/// made, in that order.
pub async fn submit_job(
    backend: &dyn AnalysisBackend,
    credentials: &CredentialStore,
    selection: &[String],
) -> Result<Job> {
    if selection.is_empty() {
        return Err(TrendsError::EmptySelection);
    }
    let credential = credentials.require_session_id().await?;

    tracing::info!("Submitting analysis of {} base types", selection.len());
    match backend.submit_job(selection, &credential).await {
        Ok(job_id) => {
            tracing::info!("Started job {}", job_id);
            Ok(Job::new(job_id, selection.len()))
        }
        Err(e) => {
            tracing::error!("Failed to start analysis: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::mock::ScriptedBackend;
    use crate::models::JobStatus;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    async fn credentials(session: Option<&str>) -> CredentialStore {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
        if let Some(session) = session {
            credentials.save_session_id(session).await.unwrap();
        }
        credentials
    }

    fn bases(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_selection_checked_first() {
        let backend = ScriptedBackend::new();
        let credentials = credentials(None).await;

        let result = submit_job(&backend, &credentials, &[]).await;
        assert!(matches!(result, Err(TrendsError::EmptySelection)));
        assert_eq!(backend.submit_call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let backend = ScriptedBackend::new();
        let credentials = credentials(None).await;

        let result = submit_job(&backend, &credentials, &bases(&["Item A"])).await;
        assert!(matches!(result, Err(TrendsError::MissingCredential)));
        assert_eq!(backend.submit_call_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_returns_pending_job() {
        let backend = ScriptedBackend::new();
        backend.push_submit(Ok("j1".to_string()));
        let credentials = credentials(Some("sess")).await;

        let job = submit_job(&backend, &credentials, &bases(&["Item A", "Item B"]))
            .await
            .unwrap();
        assert_eq!(job.id, "j1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress_label(), "0/2");

        let calls = backend.submit_calls.lock().unwrap();
        assert_eq!(calls[0].0, bases(&["Item A", "Item B"]));
        assert_eq!(calls[0].1, "sess");
    }

    #[tokio::test]
    async fn test_server_error_passed_through() {
        let backend = ScriptedBackend::new();
        backend.push_submit(Err(TrendsError::ApiError {
            status: 400,
            message: "Unknown base type: Item Z".to_string(),
        }));
        let credentials = credentials(Some("sess")).await;

        let err = submit_job(&backend, &credentials, &bases(&["Item Z"]))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Unknown base type: Item Z");
    }
}
