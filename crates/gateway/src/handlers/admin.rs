//! Admin handlers
//!
//! Staff-only views over the whole platform and manual control of the
//! outgoing email queue.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;

use super::UserSummary;
use crate::AppState;
use casefile_common::{
    auth::AuthUser,
    db::models::{Case, CaseStatus, VerificationStatus},
    errors::{AppError, Result},
    queue::{EmailQueueProcessor, QueueReport},
    Repository,
};

const RECENT_LIMIT: u64 = 5;

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub total_users: u64,
    pub journalists: u64,
    pub verified_journalists: u64,
    pub public_users: u64,
    pub cases: u64,
    pub published_cases: u64,
    pub active_cases: u64,
    pub pending_verifications: u64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub overview: Overview,
    pub cases_by_status: BTreeMap<String, u64>,
    pub journalists_by_verification: BTreeMap<String, u64>,
    pub recent_cases: Vec<Case>,
    pub recent_users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct EmailQueueStats {
    pub by_status: BTreeMap<String, u64>,
    pub total: u64,
}

impl EmailQueueStats {
    fn new(rows: Vec<(String, u64)>) -> Self {
        let by_status: BTreeMap<String, u64> = rows.into_iter().collect();
        Self {
            total: by_status.values().sum(),
            by_status,
        }
    }
}

impl Overview {
    fn new(
        total_users: u64,
        journalists: u64,
        verified_journalists: u64,
        cases: u64,
        published_cases: u64,
        pending_verifications: u64,
    ) -> Self {
        Self {
            total_users,
            journalists,
            verified_journalists,
            public_users: total_users.saturating_sub(journalists),
            cases,
            published_cases,
            active_cases: cases.saturating_sub(published_cases),
            pending_verifications,
        }
    }
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DashboardResponse>> {
    user.require_staff("view the dashboard")?;

    let repo = state.repo();

    let (users, journalists, verified, cases, published, pending) = futures::try_join!(
        repo.count_users(),
        repo.count_profiles(),
        repo.count_verified_profiles(),
        repo.count_cases(),
        repo.count_cases_with_status(CaseStatus::Published),
        repo.count_profiles_with_status(VerificationStatus::Pending),
    )?;

    let (cases_by_status, journalists_by_verification, recent_cases, recent_users) = futures::try_join!(
        repo.cases_by_status(),
        repo.profiles_by_verification_status(),
        repo.recent_cases(RECENT_LIMIT),
        repo.recent_users(RECENT_LIMIT),
    )?;

    Ok(Json(DashboardResponse {
        overview: Overview::new(users, journalists, verified, cases, published, pending),
        cases_by_status: cases_by_status.into_iter().collect(),
        journalists_by_verification: journalists_by_verification.into_iter().collect(),
        recent_cases,
        recent_users: recent_users.iter().map(UserSummary::from).collect(),
    }))
}

/// Email queue counts by status
pub async fn email_queue_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<EmailQueueStats>> {
    user.require_staff("view the email queue")?;

    let rows = state.repo().emails_by_status().await?;
    Ok(Json(EmailQueueStats::new(rows)))
}

/// Run one batch of the email queue now.
///
/// The batch runs on its own task: a request timeout drops only the
/// handle, so claimed rows still get their outcome recorded.
pub async fn process_email_queue(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<QueueReport>> {
    user.require_staff("process the email queue")?;

    let processor = queue_processor(&state);
    let report = tokio::spawn(async move { processor.process().await })
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Email queue task failed: {}", e),
        })??;

    info!(
        triggered_by = %user.user_id,
        released = report.released,
        processed = report.processed,
        sent = report.sent,
        failed = report.failed,
        retried = report.retried,
        errors = report.errors,
        "Email queue processed on demand"
    );

    Ok(Json(report))
}

fn queue_processor(state: &AppState) -> EmailQueueProcessor<Repository> {
    let mail = &state.config.mail;
    EmailQueueProcessor::new(
        state.repo(),
        state.mailer.clone(),
        mail.batch_size,
        mail.max_attempts,
    )
    .with_sending_lease(state.config.sending_lease())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_derived_counts() {
        let overview = Overview::new(40, 12, 7, 30, 18, 3);
        assert_eq!(overview.public_users, 28);
        assert_eq!(overview.active_cases, 12);
        assert_eq!(overview.pending_verifications, 3);
    }

    #[test]
    fn test_overview_never_underflows() {
        let overview = Overview::new(2, 5, 0, 1, 4, 0);
        assert_eq!(overview.public_users, 0);
        assert_eq!(overview.active_cases, 0);
    }

    #[test]
    fn test_email_queue_stats_total() {
        let stats = EmailQueueStats::new(vec![
            ("PENDING".to_string(), 4),
            ("SENT".to_string(), 10),
            ("FAILED".to_string(), 1),
        ]);

        assert_eq!(stats.total, 15);
        assert_eq!(stats.by_status["SENT"], 10);

        let body = serde_json::to_value(&stats).unwrap();
        assert_eq!(body["by_status"]["PENDING"], 4);
    }
}
