use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::merge::merge;
use crate::config::RunnerConfig;
use crate::errors::TrendsError;
use crate::fetcher::{mentions_gateway_busy, mentions_rate_limit, AnalysisBackend};
use crate::models::GapRecord;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub results: Vec<GapRecord>,
    /// Base type and the message it failed with
    pub failures: Vec<(String, String)>,
    pub processed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Finished(BatchReport),
    Cancelled(BatchReport),
}

impl BatchOutcome {
    pub fn report(&self) -> &BatchReport {
        match self {
            BatchOutcome::Finished(report) | BatchOutcome::Cancelled(report) => report,
        }
    }

    pub fn into_report(self) -> BatchReport {
        match self {
            BatchOutcome::Finished(report) | BatchOutcome::Cancelled(report) => report,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchOutcome::Cancelled(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    RateLimited,
    GatewayBusy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        key: String,
        index: usize,
        total: usize,
    },
    Waiting {
        key: String,
        reason: Throttle,
        wait: Duration,
    },
    Analyzed(GapRecord),
    Failed {
        key: String,
        message: String,
    },
}

/// Runs per-item gap analyses one at a time, backing off when throttled.
pub struct BatchRunner {
    backend: Arc<dyn AnalysisBackend>,
    config: RunnerConfig,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl BatchRunner {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: RunnerConfig) -> Self {
        Self {
            backend,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// How long to wait before retrying after `error`, if it is a throttle.
    fn throttle_wait(&self, error: &TrendsError) -> Option<(Throttle, Duration)> {
        match error {
            TrendsError::RateLimitError { retry_after, .. } => Some((
                Throttle::RateLimited,
                retry_after.unwrap_or(self.config.rate_limit_wait),
            )),
            TrendsError::GatewayBusy { retry_after, .. } => Some((
                Throttle::GatewayBusy,
                retry_after.unwrap_or(self.config.gateway_wait),
            )),
            // Transport failures carry no status, only the upstream text
            TrendsError::NetworkError(message) if mentions_rate_limit(message) => {
                Some((Throttle::RateLimited, self.config.rate_limit_wait))
            }
            TrendsError::NetworkError(message) if mentions_gateway_busy(message) => {
                Some((Throttle::GatewayBusy, self.config.gateway_wait))
            }
            _ => None,
        }
    }

    /// Sleeps for `duration`; false if `cancel` fired first.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    pub async fn run(
        &self,
        keys: &[String],
        credential: &str,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut report = BatchReport::default();

        for (index, key) in keys.iter().enumerate() {
            if cancel.is_cancelled() {
                return BatchOutcome::Cancelled(report);
            }
            if index > 0 && !self.pause(self.config.item_delay, cancel).await {
                tracing::info!("Batch cancelled after {} of {} items", index, keys.len());
                return BatchOutcome::Cancelled(report);
            }

            self.emit(BatchEvent::Started {
                key: key.clone(),
                index,
                total: keys.len(),
            });

            let mut waits = 0;
            loop {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("Batch cancelled while analyzing {}", key);
                        return BatchOutcome::Cancelled(report);
                    }
                    result = self.backend.analyze_base(key, credential) => result,
                };
                let error = match result {
                    Ok(record) => {
                        tracing::debug!("Analyzed {}: gap {:.1}c", key, record.gap_chaos);
                        report.results = merge(&report.results, std::slice::from_ref(&record));
                        self.emit(BatchEvent::Analyzed(record));
                        break;
                    }
                    Err(e) => e,
                };

                let Some((reason, wait)) = self.throttle_wait(&error) else {
                    tracing::error!("Error analyzing {}: {}", key, error);
                    self.record_failure(&mut report, key, error.user_message());
                    break;
                };

                if waits >= self.config.max_waits_per_item {
                    tracing::error!("Giving up on {} after {} throttled attempts", key, waits);
                    let message = format!(
                        "Gave up after {} throttled attempts: {}",
                        waits,
                        error.user_message()
                    );
                    self.record_failure(&mut report, key, message);
                    break;
                }

                waits += 1;
                tracing::warn!("{:?} while analyzing {}, waiting {:?}", reason, key, wait);
                self.emit(BatchEvent::Waiting {
                    key: key.clone(),
                    reason,
                    wait,
                });
                if !self.pause(wait, cancel).await {
                    tracing::info!("Batch cancelled while waiting on {}", key);
                    return BatchOutcome::Cancelled(report);
                }
            }

            report.processed += 1;
        }

        BatchOutcome::Finished(report)
    }

    fn record_failure(&self, report: &mut BatchReport, key: &str, message: String) {
        self.emit(BatchEvent::Failed {
            key: key.to_string(),
            message: message.clone(),
        });
        report.failures.push((key.to_string(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::mock::{gateway_busy, rate_limited, ScriptedBackend};
    use tokio::time::Instant;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn runner(backend: &Arc<ScriptedBackend>) -> BatchRunner {
        BatchRunner::new(backend.clone(), RunnerConfig::default())
    }

    fn elapsed(times: &[Instant], from: usize, to: usize) -> Duration {
        times[to].duration_since(times[from])
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honours_retry_after() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_analyze(Err(rate_limited(Some(45))));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = runner(&backend).with_events(tx);

        let outcome = runner
            .run(&keys(&["A", "B"]), "sess", &CancellationToken::new())
            .await;

        assert_eq!(backend.analyzed_keys(), keys(&["A", "A", "B"]));
        let times = backend.analyze_times();
        assert!(elapsed(&times, 0, 1) >= Duration::from_secs(45));
        assert!(elapsed(&times, 0, 1) < Duration::from_secs(46));
        assert!(elapsed(&times, 1, 2) >= Duration::from_secs(2));
        assert!(elapsed(&times, 1, 2) < Duration::from_secs(3));

        let report = outcome.report();
        assert!(!outcome.is_cancelled());
        assert_eq!(report.processed, 2);
        assert_eq!(report.results.len(), 2);
        assert!(report.failures.is_empty());

        let mut waited = None;
        while let Ok(event) = rx.try_recv() {
            if let BatchEvent::Waiting { wait, reason, .. } = event {
                waited = Some((reason, wait));
            }
        }
        assert_eq!(waited, Some((Throttle::RateLimited, Duration::from_secs(45))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_gateway_default_wait() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_analyze(Err(gateway_busy(None)));

        let outcome = runner(&backend)
            .run(&keys(&["A"]), "sess", &CancellationToken::new())
            .await;

        let times = backend.analyze_times();
        assert_eq!(backend.analyzed_keys(), keys(&["A", "A"]));
        assert!(elapsed(&times, 0, 1) >= Duration::from_secs(30));
        assert!(elapsed(&times, 0, 1) < Duration::from_secs(31));
        assert_eq!(outcome.report().processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_detected_from_message() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_analyze(Err(TrendsError::NetworkError(
            "upstream said: Too Many Requests".to_string(),
        )));

        let outcome = runner(&backend)
            .run(&keys(&["A"]), "sess", &CancellationToken::new())
            .await;

        let times = backend.analyze_times();
        assert!(elapsed(&times, 0, 1) >= Duration::from_secs(60));
        assert!(outcome.report().failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_number_in_parse_error_is_not_throttle() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_analyze(Err(TrendsError::ParseError(
            r#"Failed to parse response. Response body: {"gap_chaos": 4.502}"#.to_string(),
        )));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = runner(&backend)
            .with_events(tx)
            .run(&keys(&["A"]), "sess", &CancellationToken::new())
            .await;

        assert_eq!(backend.analyzed_keys(), keys(&["A"]));
        let report = outcome.report();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "A");
        assert_eq!(report.processed, 1);
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, BatchEvent::Waiting { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failure_moves_on() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_analyze(Err(TrendsError::ApiError {
            status: 500,
            message: "boom".to_string(),
        }));

        let outcome = runner(&backend)
            .run(&keys(&["A", "B", "C"]), "sess", &CancellationToken::new())
            .await;

        let report = outcome.into_report();
        assert_eq!(report.failures, vec![("A".to_string(), "boom".to_string())]);
        assert_eq!(report.processed, 3);
        // New keys are prepended
        let order: Vec<_> = report.results.iter().map(|r| r.base_type.as_str()).collect();
        assert_eq!(order, vec!["C", "B"]);
        assert_eq!(backend.analyzed_keys(), keys(&["A", "B", "C"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cap_abandons_item() {
        let backend = Arc::new(ScriptedBackend::new());
        for _ in 0..3 {
            backend.push_analyze(Err(rate_limited(Some(1))));
        }
        let config = RunnerConfig {
            max_waits_per_item: 2,
            ..RunnerConfig::default()
        };

        let outcome = BatchRunner::new(backend.clone(), config)
            .run(&keys(&["A", "B"]), "sess", &CancellationToken::new())
            .await;

        assert_eq!(backend.analyzed_keys(), keys(&["A", "A", "A", "B"]));
        let report = outcome.report();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "A");
        assert_eq!(report.results[0].base_type, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_item_delay() {
        let backend = Arc::new(ScriptedBackend::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let outcome = runner(&backend)
            .run(&keys(&["A", "B", "C"]), "sess", &cancel)
            .await;

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.report().processed, 2);
        assert_eq!(outcome.report().results.len(), 2);
        assert_eq!(backend.analyzed_keys(), keys(&["A", "B"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_throttle_wait() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_analyze(Err(rate_limited(None)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let outcome = runner(&backend).run(&keys(&["A"]), "sess", &cancel).await;

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.report().processed, 0);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_item() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_analyze_delay(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let start = Instant::now();
        let outcome = runner(&backend)
            .with_events(tx)
            .run(&keys(&["A", "B"]), "sess", &cancel)
            .await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome, BatchOutcome::Cancelled(BatchReport::default()));
        assert_eq!(backend.analyzed_keys(), keys(&["A"]));
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, BatchEvent::Analyzed(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let backend = Arc::new(ScriptedBackend::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = runner(&backend).run(&keys(&["A"]), "sess", &cancel).await;
        assert_eq!(outcome, BatchOutcome::Cancelled(BatchReport::default()));
        assert!(backend.analyzed_keys().is_empty());
    }
}
