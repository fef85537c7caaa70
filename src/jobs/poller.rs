use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::merge::merge;
use super::submitter::submit_job;
use crate::config::PollerConfig;
use crate::errors::{Result, TrendsError};
use crate::fetcher::AnalysisBackend;
use crate::models::{GapRecord, Job, JobStatus, JobStatusResponse};
use crate::storage::CredentialStore;

const FAILED_FALLBACK: &str = "Analysis failed";

#[derive(Debug, Clone, Default, PartialEq)]
pub enum PollState {
    #[default]
    Idle,
    Polling,
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Progress {
        job_id: String,
        progress: u32,
        total: u32,
        current_item: Option<String>,
    },
    InvalidRecords {
        job_id: String,
        dropped: usize,
    },
    Completed {
        job_id: String,
        results: usize,
    },
    Failed {
        job_id: String,
        message: String,
    },
}

/// What the monitor currently knows about the watched job.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    pub active_job_id: Option<String>,
    pub job: Option<Job>,
    pub state: PollState,
    /// Every result seen this session, merged by base type
    pub results: Vec<GapRecord>,
    pub last_error: Option<String>,
}

fn lock(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Submits analysis jobs and follows them until they finish.
pub struct JobMonitor {
    backend: Arc<dyn AnalysisBackend>,
    credentials: CredentialStore,
    config: PollerConfig,
    state: Arc<Mutex<MonitorState>>,
    events: mpsc::UnboundedSender<MonitorEvent>,
}

impl JobMonitor {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        credentials: CredentialStore,
        config: PollerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let monitor = Self {
            backend,
            credentials,
            config,
            state: Arc::new(Mutex::new(MonitorState::default())),
            events,
        };
        (monitor, receiver)
    }

    pub fn snapshot(&self) -> MonitorState {
        lock(&self.state).clone()
    }

    pub async fn submit_and_watch(&self, selection: &[String]) -> Result<PollHandle> {
        match submit_job(self.backend.as_ref(), &self.credentials, selection).await {
            Ok(job) => Ok(self.watch(job)),
            Err(e) => {
                lock(&self.state).last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Starts polling `job`. Any job watched before stops being applied.
    pub fn watch(&self, job: Job) -> PollHandle {
        let job_id = job.id.clone();
        {
            let mut state = lock(&self.state);
            state.active_job_id = Some(job_id.clone());
            state.job = Some(job);
            state.state = PollState::Polling;
            state.last_error = None;
        }

        let token = CancellationToken::new();
        let poll = Poll {
            backend: self.backend.clone(),
            job_id: job_id.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
        };
        let task = tokio::spawn(poll.run(self.config.interval, token.clone()));

        PollHandle {
            job_id,
            token,
            state: self.state.clone(),
            task: Some(task),
        }
    }
}

/// Controls one polling task. Dropping the handle stops the polling.
pub struct PollHandle {
    job_id: String,
    token: CancellationToken,
    state: Arc<Mutex<MonitorState>>,
    task: Option<JoinHandle<PollState>>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stops client-side polling. The server keeps running the job.
    pub fn stop(&self) {
        self.token.cancel();
        let mut state = lock(&self.state);
        if state.active_job_id.as_deref() == Some(self.job_id.as_str())
            && state.state == PollState::Polling
        {
            state.state = PollState::Cancelled;
            state.active_job_id = None;
        }
    }

    /// Stops polling and forgets the job.
    pub fn clear(&self) {
        self.stop();
        let mut state = lock(&self.state);
        if state.job.as_ref().is_some_and(|job| job.id == self.job_id) {
            state.job = None;
        }
    }

    /// Waits for the polling task to end and returns how it ended.
    pub async fn wait(mut self) -> PollState {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(PollState::Cancelled),
            None => PollState::Cancelled,
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Poll {
    backend: Arc<dyn AnalysisBackend>,
    job_id: String,
    state: Arc<Mutex<MonitorState>>,
    events: mpsc::UnboundedSender<MonitorEvent>,
}

impl Poll {
    async fn run(self, interval: std::time::Duration, token: CancellationToken) -> PollState {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<Result<JobStatusResponse>> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("Stopped polling job {}", self.job_id);
                    in_flight.abort_all();
                    return PollState::Cancelled;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let response = match joined {
                        Ok(response) => response,
                        Err(e) => {
                            if !e.is_cancelled() {
                                tracing::warn!("Status request for job {} panicked: {}", self.job_id, e);
                            }
                            continue;
                        }
                    };
                    if let Some(done) = self.apply(response) {
                        in_flight.abort_all();
                        return done;
                    }
                }
                // The first tick completes at once, giving the immediate request
                _ = ticker.tick() => {
                    if !self.is_current() {
                        in_flight.abort_all();
                        return PollState::Cancelled;
                    }
                    let backend = self.backend.clone();
                    let job_id = self.job_id.clone();
                    in_flight.spawn(async move { backend.job_status(&job_id).await });
                }
            }
        }
    }

    fn is_current(&self) -> bool {
        let state = lock(&self.state);
        state.active_job_id.as_deref() == Some(self.job_id.as_str())
            && state.state == PollState::Polling
    }

    fn emit(&self, event: MonitorEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Applies one status response. Returns the final state once polling
    /// should end.
    fn apply(&self, response: Result<JobStatusResponse>) -> Option<PollState> {
        let mut guard = lock(&self.state);
        if guard.active_job_id.as_deref() != Some(self.job_id.as_str())
            || guard.state != PollState::Polling
        {
            tracing::debug!("Discarding stale status for job {}", self.job_id);
            return Some(PollState::Cancelled);
        }

        let response = match response {
            Ok(response) => response,
            Err(TrendsError::NotFound(message)) => {
                tracing::error!("Job {} not found: {}", self.job_id, message);
                return Some(self.fail(&mut guard, message));
            }
            Err(e) => {
                tracing::warn!("Error polling job {}: {}", self.job_id, e);
                return None;
            }
        };

        let status = response.status;
        let server_error = response.error.clone();
        let state = &mut *guard;
        let job = state
            .job
            .get_or_insert_with(|| Job::new(self.job_id.clone(), 0));
        let update = job.apply(response);
        state.results = merge(&state.results, &update.accepted);

        self.emit(MonitorEvent::Progress {
            job_id: self.job_id.clone(),
            progress: job.progress,
            total: job.total,
            current_item: job.current_item.clone(),
        });
        if update.dropped > 0 {
            self.emit(MonitorEvent::InvalidRecords {
                job_id: self.job_id.clone(),
                dropped: update.dropped,
            });
        }

        if !status.is_terminal() {
            return None;
        }
        if status == JobStatus::Failed {
            let message = server_error.unwrap_or_else(|| FAILED_FALLBACK.to_string());
            tracing::error!("Job {} failed: {}", self.job_id, message);
            return Some(self.fail(state, message));
        }

        let results = job.results.len();
        tracing::info!("Job {} completed with {} results", self.job_id, results);
        state.state = PollState::Completed;
        state.active_job_id = None;
        self.emit(MonitorEvent::Completed {
            job_id: self.job_id.clone(),
            results,
        });
        Some(PollState::Completed)
    }

    fn fail(&self, state: &mut MonitorState, message: String) -> PollState {
        state.state = PollState::Failed(message.clone());
        state.active_job_id = None;
        state.last_error = Some(message.clone());
        self.emit(MonitorEvent::Failed {
            job_id: self.job_id.clone(),
            message: message.clone(),
        });
        PollState::Failed(message)
    }
}
