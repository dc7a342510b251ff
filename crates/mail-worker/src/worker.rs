//! Mail worker run loop
//!
//! Drains the email queue on a fixed interval. Repeated failures open a
//! circuit breaker that pauses the loop before trying again.

use casefile_common::queue::{EmailQueueProcessor, EmailQueueStore, QueueReport};
use std::time::Duration;
use tracing::{error, info, warn};

/// Consecutive failed runs before the breaker opens
pub const MAX_FAILURES: u32 = 5;

/// How long an open breaker pauses the loop
pub const CIRCUIT_BREAK_DURATION: Duration = Duration::from_secs(30);

/// Counts consecutive failed runs
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    failures: u32,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_open(&self) -> bool {
        self.failures >= self.threshold
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

pub struct MailWorker<S: EmailQueueStore> {
    processor: EmailQueueProcessor<S>,
    breaker: CircuitBreaker,
}

impl<S: EmailQueueStore> MailWorker<S> {
    pub fn new(processor: EmailQueueProcessor<S>) -> Self {
        Self {
            processor,
            breaker: CircuitBreaker::new(MAX_FAILURES),
        }
    }

    /// Process one batch, tracking the outcome in the breaker
    pub async fn tick(&mut self) -> Option<QueueReport> {
        match self.processor.process().await {
            Ok(report) => {
                self.breaker.record_success();
                if report.processed > 0 || report.released > 0 {
                    info!(
                        processed = report.processed,
                        sent = report.sent,
                        failed = report.failed,
                        retried = report.retried,
                        errors = report.errors,
                        "Email batch processed"
                    );
                }
                Some(report)
            }
            Err(e) => {
                self.breaker.record_failure();
                error!(
                    error = %e,
                    failures = self.breaker.failures(),
                    "Failed to process email queue"
                );
                None
            }
        }
    }

    /// Run until `shutdown` resolves
    pub async fn run<F>(mut self, interval: Duration, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            if self.breaker.is_open() {
                warn!(
                    failures = self.breaker.failures(),
                    "Circuit breaker open, pausing..."
                );
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(CIRCUIT_BREAK_DURATION) => {}
                }
                self.breaker.reset();
                info!("Circuit breaker reset, resuming...");
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casefile_common::db::models::{EmailQueue, EmailStatus};
    use casefile_common::errors::{AppError, Result};
    use casefile_common::mail::LogMailer;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    /// Store whose queue read fails until `healthy_after` calls have been made
    struct FlakyStore {
        calls: Arc<AtomicUsize>,
        healthy_after: usize,
    }

    #[async_trait]
    impl EmailQueueStore for FlakyStore {
        async fn release_stale(&self, _stale_before: DateTime<Utc>, _max_attempts: i32) -> Result<u64> {
            Ok(0)
        }

        async fn pending(&self, _limit: u64, _max_attempts: i32) -> Result<Vec<EmailQueue>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.healthy_after {
                return Err(AppError::Internal {
                    message: "database unavailable".to_string(),
                });
            }
            Ok(Vec::new())
        }

        async fn claim(&self, _id: Uuid) -> Result<bool> {
            Ok(false)
        }

        async fn mark_sent(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn record_failure(
            &self,
            _email: &EmailQueue,
            _error: &str,
            _max_attempts: i32,
        ) -> Result<EmailStatus> {
            Ok(EmailStatus::Failed)
        }
    }

    fn worker(healthy_after: usize) -> (MailWorker<FlakyStore>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = FlakyStore {
            calls: calls.clone(),
            healthy_after,
        };
        let processor =
            EmailQueueProcessor::new(store, Arc::new(LogMailer::new("noreply@casefile.local")), 10, 3);
        (MailWorker::new(processor), calls)
    }

    #[test]
    fn test_breaker_opens_at_threshold() {
        let mut breaker = CircuitBreaker::new(3);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());

        breaker.reset();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_success_clears_failures() {
        let mut breaker = CircuitBreaker::new(2);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failures(), 1);
    }

    #[tokio::test]
    async fn test_tick_tracks_failures() {
        let (mut worker, calls) = worker(2);

        assert!(worker.tick().await.is_none());
        assert!(worker.tick().await.is_none());
        assert_eq!(worker.breaker.failures(), 2);

        let report = worker.tick().await.unwrap();
        assert_eq!(report, QueueReport::default());
        assert_eq!(worker.breaker.failures(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (worker, calls) = worker(0);

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        };
        worker.run(Duration::from_millis(10), shutdown).await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
