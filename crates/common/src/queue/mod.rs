//! Email queue processing
//!
//! Provides:
//! - `EmailQueueStore`, the persistence seam for queued emails
//! - `EmailQueueProcessor`, which claims, delivers and retries rows
//! - `QueueReport`, the outcome of one processing run
//!
//! A claimed row sits in SENDING until its outcome is recorded. Rows left
//! there longer than the sending lease (a crashed worker, a cancelled run)
//! count as an interrupted attempt and return to PENDING, or FAILED once
//! out of attempts.

use crate::db::models::{EmailQueue, EmailStatus};
use crate::db::Repository;
use crate::errors::Result;
use crate::mail::{EmailMessage, Mailer};
use crate::metrics::record_email;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default time a row may stay in SENDING before it is reclaimed
pub const DEFAULT_SENDING_LEASE: Duration = Duration::from_secs(300);

/// Error stored on rows reclaimed from SENDING
pub const INTERRUPTED_ERROR: &str = "Delivery interrupted before completion";

/// Persistence operations the processor needs
#[async_trait]
pub trait EmailQueueStore: Send + Sync {
    /// SENDING rows last touched before `stale_before` count one failed
    /// attempt and move to PENDING, or FAILED at `max_attempts`.
    /// Returns the number of rows released.
    async fn release_stale(&self, stale_before: DateTime<Utc>, max_attempts: i32) -> Result<u64>;

    /// Oldest PENDING rows with `attempts < max_attempts`
    async fn pending(&self, limit: u64, max_attempts: i32) -> Result<Vec<EmailQueue>>;

    /// PENDING -> SENDING; false when the row is no longer PENDING
    async fn claim(&self, id: Uuid) -> Result<bool>;

    async fn mark_sent(&self, id: Uuid) -> Result<()>;

    /// Increment attempts, store the error, and return the new status
    async fn record_failure(
        &self,
        email: &EmailQueue,
        error: &str,
        max_attempts: i32,
    ) -> Result<EmailStatus>;
}

#[async_trait]
impl EmailQueueStore for Repository {
    async fn release_stale(&self, stale_before: DateTime<Utc>, max_attempts: i32) -> Result<u64> {
        self.release_stale_emails(stale_before.into(), max_attempts).await
    }

    async fn pending(&self, limit: u64, max_attempts: i32) -> Result<Vec<EmailQueue>> {
        self.pending_emails(limit, max_attempts).await
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        self.claim_email(id).await
    }

    async fn mark_sent(&self, id: Uuid) -> Result<()> {
        self.mark_email_sent(id).await
    }

    async fn record_failure(
        &self,
        email: &EmailQueue,
        error: &str,
        max_attempts: i32,
    ) -> Result<EmailStatus> {
        self.record_email_failure(email, error, max_attempts).await
    }
}

/// Outcome of one processing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    /// Stale SENDING rows reclaimed at the start of the run
    pub released: usize,
    /// Rows claimed and attempted
    pub processed: usize,
    pub sent: usize,
    /// Rows that reached the attempt limit this run
    pub failed: usize,
    /// Rows returned to PENDING for a later run
    pub retried: usize,
    /// Rows skipped because the store could not be updated
    pub errors: usize,
}

/// Email queue processor
pub struct EmailQueueProcessor<S: EmailQueueStore> {
    store: S,
    mailer: Arc<dyn Mailer>,
    batch_size: u64,
    max_attempts: i32,
    sending_lease: TimeDelta,
}

impl<S: EmailQueueStore> EmailQueueProcessor<S> {
    pub fn new(store: S, mailer: Arc<dyn Mailer>, batch_size: u64, max_attempts: i32) -> Self {
        Self {
            store,
            mailer,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            sending_lease: TimeDelta::seconds(DEFAULT_SENDING_LEASE.as_secs() as i64),
        }
    }

    /// How long a claimed row may stay in SENDING. Must exceed the
    /// longest single delivery, retries included.
    pub fn with_sending_lease(mut self, lease: Duration) -> Self {
        self.sending_lease = TimeDelta::from_std(lease).unwrap_or(TimeDelta::MAX);
        self
    }

    /// Deliver up to one batch of pending emails
    pub async fn process(&self) -> Result<QueueReport> {
        let mut report = QueueReport {
            released: self.release_stale().await?,
            ..QueueReport::default()
        };

        let batch = self.store.pending(self.batch_size, self.max_attempts).await?;
        if batch.is_empty() {
            debug!("Email queue empty");
            return Ok(report);
        }

        for email in batch {
            if let Err(e) = self.deliver(&email, &mut report).await {
                report.errors += 1;
                error!(
                    email_id = %email.id,
                    error = %e,
                    "Email queue update failed, row left for a later run"
                );
            }
        }

        info!(
            provider = self.mailer.provider(),
            released = report.released,
            processed = report.processed,
            sent = report.sent,
            failed = report.failed,
            retried = report.retried,
            errors = report.errors,
            "Email queue run complete"
        );

        Ok(report)
    }

    async fn release_stale(&self) -> Result<usize> {
        let Some(stale_before) = Utc::now().checked_sub_signed(self.sending_lease) else {
            return Ok(0);
        };

        let released = self
            .store
            .release_stale(stale_before, self.max_attempts)
            .await? as usize;

        if released > 0 {
            warn!(released, "Reclaimed emails stuck in SENDING");
        }
        Ok(released)
    }

    /// Claim, send and record one row
    async fn deliver(&self, email: &EmailQueue, report: &mut QueueReport) -> Result<()> {
        if !self.store.claim(email.id).await? {
            debug!(email_id = %email.id, "Email already claimed, skipping");
            return Ok(());
        }
        report.processed += 1;

        let message = EmailMessage {
            to: email.to_address.clone(),
            subject: email.subject.clone(),
            html: email.html_content.clone(),
            text: email.text_content.clone(),
        };

        match self.mailer.send(&message).await {
            Ok(()) => {
                self.store.mark_sent(email.id).await?;
                record_email(EmailStatus::Sent);
                report.sent += 1;
            }
            Err(e) => {
                let error = e.to_string();
                let status = self
                    .store
                    .record_failure(email, &error, self.max_attempts)
                    .await?;

                warn!(
                    email_id = %email.id,
                    attempts = email.attempts + 1,
                    status = %status,
                    error = %error,
                    "Email delivery failed"
                );

                record_email(status);
                if status == EmailStatus::Failed {
                    report.failed += 1;
                } else {
                    report.retried += 1;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::mail::mock::MockMailer;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory queue with the same transition rules as the database
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<EmailQueue>>,
        steal_on_claim: Mutex<Vec<Uuid>>,
        broken_mark_sent: Mutex<Vec<Uuid>>,
    }

    impl MemoryStore {
        fn push(&self, to: &str, attempts: i32) -> Uuid {
            let now = Utc::now().into();
            let row = EmailQueue {
                id: Uuid::new_v4(),
                to_address: to.to_string(),
                subject: "Casefile: update".to_string(),
                html_content: "<p>x</p>".to_string(),
                text_content: None,
                template_id: None,
                data: None,
                status: EmailStatus::Pending.to_string(),
                attempts,
                error: None,
                sent_at: None,
                created_at: now,
                updated_at: now,
            };
            let id = row.id;
            self.rows.lock().unwrap().push(row);
            id
        }

        fn row(&self, id: Uuid) -> EmailQueue {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl EmailQueueStore for MemoryStore {
        async fn release_stale(&self, stale_before: DateTime<Utc>, max_attempts: i32) -> Result<u64> {
            let mut released = 0;
            for row in self.rows.lock().unwrap().iter_mut() {
                if row.email_status() == EmailStatus::Sending && row.updated_at < stale_before {
                    row.attempts += 1;
                    row.error = Some(INTERRUPTED_ERROR.to_string());
                    row.status = EmailStatus::after_failure(row.attempts, max_attempts).to_string();
                    row.updated_at = Utc::now().into();
                    released += 1;
                }
            }
            Ok(released)
        }

        async fn pending(&self, limit: u64, max_attempts: i32) -> Result<Vec<EmailQueue>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.is_deliverable(max_attempts))
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn claim(&self, id: Uuid) -> Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.iter_mut().find(|r| r.id == id).unwrap();
            if self.steal_on_claim.lock().unwrap().contains(&id) {
                row.status = EmailStatus::Sending.to_string();
                return Ok(false);
            }
            if row.email_status() != EmailStatus::Pending {
                return Ok(false);
            }
            row.status = EmailStatus::Sending.to_string();
            row.updated_at = Utc::now().into();
            Ok(true)
        }

        async fn mark_sent(&self, id: Uuid) -> Result<()> {
            if self.broken_mark_sent.lock().unwrap().contains(&id) {
                return Err(AppError::DatabaseConnection {
                    message: "connection reset".to_string(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            let row = rows.iter_mut().find(|r| r.id == id).unwrap();
            row.status = EmailStatus::Sent.to_string();
            row.sent_at = Some(Utc::now().into());
            Ok(())
        }

        async fn record_failure(
            &self,
            email: &EmailQueue,
            error: &str,
            max_attempts: i32,
        ) -> Result<EmailStatus> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.iter_mut().find(|r| r.id == email.id).unwrap();
            row.attempts = email.attempts + 1;
            row.error = Some(error.to_string());
            let status = EmailStatus::after_failure(row.attempts, max_attempts);
            row.status = status.to_string();
            Ok(status)
        }
    }

    /// Hangs on its first delivery, then behaves
    #[derive(Default)]
    struct HangOnceMailer {
        hung: AtomicBool,
        inner: MockMailer,
    }

    #[async_trait]
    impl Mailer for HangOnceMailer {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            if !self.hung.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.inner.send(message).await
        }

        fn provider(&self) -> &str {
            "hang-once"
        }
    }

    fn processor(store: MemoryStore, mailer: MockMailer) -> (EmailQueueProcessor<MemoryStore>, Arc<MockMailer>) {
        let mailer = Arc::new(mailer);
        (EmailQueueProcessor::new(store, mailer.clone(), 10, 3), mailer)
    }

    #[tokio::test]
    async fn test_successful_delivery_marks_sent() {
        let store = MemoryStore::default();
        let id = store.push("a@example.org", 0);
        let (processor, mailer) = processor(store, MockMailer::default());

        let report = processor.process().await.unwrap();

        assert_eq!(
            report,
            QueueReport { processed: 1, sent: 1, ..QueueReport::default() }
        );
        let row = processor.store.row(id);
        assert_eq!(row.email_status(), EmailStatus::Sent);
        assert!(row.sent_at.is_some());
        assert_eq!(mailer.sent_to(), vec!["a@example.org".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_returns_row_to_pending_until_limit() {
        let store = MemoryStore::default();
        let id = store.push("down@example.org", 0);
        let (processor, _) = processor(store, MockMailer::failing_for(&["down@example.org"]));

        let first = processor.process().await.unwrap();
        assert_eq!(first.retried, 1);
        assert_eq!(processor.store.row(id).email_status(), EmailStatus::Pending);
        assert_eq!(processor.store.row(id).attempts, 1);

        processor.process().await.unwrap();
        let third = processor.process().await.unwrap();
        assert_eq!(third.failed, 1);

        let row = processor.store.row(id);
        assert_eq!(row.email_status(), EmailStatus::Failed);
        assert_eq!(row.attempts, 3);
        assert_eq!(row.error.as_deref(), Some("Mail delivery error: mailbox unavailable"));

        // A FAILED row is never picked up again
        let after = processor.process().await.unwrap();
        assert_eq!(after, QueueReport::default());
    }

    #[tokio::test]
    async fn test_rows_at_attempt_limit_are_ignored() {
        let store = MemoryStore::default();
        store.push("old@example.org", 3);
        let (processor, mailer) = processor(store, MockMailer::default());

        assert_eq!(processor.process().await.unwrap().processed, 0);
        assert!(mailer.sent_to().is_empty());
    }

    #[tokio::test]
    async fn test_claimed_elsewhere_is_skipped() {
        let store = MemoryStore::default();
        let taken = store.push("taken@example.org", 0);
        store.push("free@example.org", 0);
        store.steal_on_claim.lock().unwrap().push(taken);
        let (processor, mailer) = processor(store, MockMailer::default());

        let report = processor.process().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(mailer.sent_to(), vec!["free@example.org".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_size_limits_run() {
        let store = MemoryStore::default();
        for i in 0..5 {
            store.push(&format!("r{}@example.org", i), 0);
        }
        let mailer = Arc::new(MockMailer::default());
        let processor = EmailQueueProcessor::new(store, mailer.clone(), 2, 3);

        assert_eq!(processor.process().await.unwrap().sent, 2);
        assert_eq!(processor.process().await.unwrap().sent, 2);
        assert_eq!(processor.process().await.unwrap().sent, 1);
        assert_eq!(mailer.sent_to().len(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_reclaimed_after_lease() {
        let store = MemoryStore::default();
        let id = store.push("slow@example.org", 0);
        let mailer = Arc::new(HangOnceMailer::default());
        let processor = EmailQueueProcessor::new(store, mailer.clone(), 10, 3)
            .with_sending_lease(Duration::from_millis(20));

        // The run is dropped mid-delivery, as a request timeout would do
        let cancelled = tokio::time::timeout(Duration::from_millis(50), processor.process()).await;
        assert!(cancelled.is_err());
        assert_eq!(processor.store.row(id).email_status(), EmailStatus::Sending);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let report = processor.process().await.unwrap();
        assert_eq!(report.released, 1);
        assert_eq!(report.sent, 1);

        let row = processor.store.row(id);
        assert_eq!(row.email_status(), EmailStatus::Sent);
        assert_eq!(row.attempts, 1);
        assert_eq!(mailer.inner.sent_to(), vec!["slow@example.org".to_string()]);
    }

    #[tokio::test]
    async fn test_fresh_sending_rows_are_left_alone() {
        let store = MemoryStore::default();
        let id = store.push("busy@example.org", 0);
        store.steal_on_claim.lock().unwrap().push(id);
        let (processor, mailer) = processor(store, MockMailer::default());

        // Another worker holds the row inside the default lease
        let report = processor.process().await.unwrap();
        assert_eq!(report.released, 0);
        let report = processor.process().await.unwrap();
        assert_eq!(report.released, 0);
        assert_eq!(processor.store.row(id).email_status(), EmailStatus::Sending);
        assert!(mailer.sent_to().is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_row_at_limit_fails() {
        let store = MemoryStore::default();
        let id = store.push("last@example.org", 2);
        store.steal_on_claim.lock().unwrap().push(id);
        let (processor, _) = processor(store, MockMailer::default());
        let processor = processor.with_sending_lease(Duration::ZERO);

        // First run: the row is taken elsewhere and left in SENDING
        processor.process().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let report = processor.process().await.unwrap();
        assert_eq!(report.released, 1);
        let row = processor.store.row(id);
        assert_eq!(row.email_status(), EmailStatus::Failed);
        assert_eq!(row.attempts, 3);
        assert_eq!(row.error.as_deref(), Some(INTERRUPTED_ERROR));
    }

    #[tokio::test]
    async fn test_store_error_does_not_abort_batch() {
        let store = MemoryStore::default();
        let broken = store.push("first@example.org", 0);
        let healthy = store.push("second@example.org", 0);
        store.broken_mark_sent.lock().unwrap().push(broken);
        let (processor, mailer) = processor(store, MockMailer::default());

        let report = processor.process().await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(processor.store.row(healthy).email_status(), EmailStatus::Sent);
        assert_eq!(processor.store.row(broken).email_status(), EmailStatus::Sending);
        assert_eq!(mailer.sent_to().len(), 2);
    }
}
