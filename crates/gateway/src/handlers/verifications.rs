//! Verification handlers
//!
//! A verification is one user's verdict on a case, document, source or
//! journalist, with an optional confidence score.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{clean, UserSummary};
use crate::extract::{ApiJson, ApiQuery};
use crate::AppState;
use casefile_common::{
    auth::AuthUser,
    db::models::{Verification, VerificationStatus, VerificationTarget, VerifierType},
    db::{NewVerification, Page, Pagination, VerificationFilter},
    errors::Result,
};

const DEFAULT_LIMIT: u64 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct ListVerificationsQuery {
    pub target_id: Option<Uuid>,
    pub target_type: Option<VerificationTarget>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct VerificationView {
    #[serde(flatten)]
    pub verification: Verification,
    pub verifier: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct VerificationListResponse {
    pub verifications: Vec<VerificationView>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVerificationRequest {
    pub target_id: Uuid,
    pub target_type: VerificationTarget,
    pub status: VerificationStatus,

    #[validate(range(min = 1, max = 100))]
    pub confidence: Option<i32>,

    #[validate(length(max = 5000))]
    pub notes: Option<String>,

    #[validate(length(max = 5000))]
    pub evidence: Option<String>,
}

/// Journalists only see the verifications they wrote
fn scoped_filter(user: &AuthUser, query: &ListVerificationsQuery) -> VerificationFilter {
    VerificationFilter {
        target_id: query.target_id,
        target_type: query.target_type,
        verifier_id: user.is_journalist().then_some(user.user_id),
    }
}

pub async fn list_verifications(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ListVerificationsQuery>,
) -> Result<Json<VerificationListResponse>> {
    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT);
    let filter = scoped_filter(&user, &query);

    let (rows, total) = state.repo().list_verifications(&filter, page).await?;

    let verifications = rows
        .into_iter()
        .map(|(verification, verifier)| VerificationView {
            verifier: verifier.as_ref().map(UserSummary::from),
            verification,
        })
        .collect();

    Ok(Json(VerificationListResponse {
        verifications,
        pagination: page.pagination(total),
    }))
}

pub async fn create_verification(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateVerificationRequest>,
) -> Result<(StatusCode, Json<Verification>)> {
    let verification = state
        .repo()
        .create_verification(NewVerification {
            target_id: req.target_id,
            target_type: req.target_type,
            status: req.status,
            confidence: req.confidence,
            notes: clean(req.notes),
            evidence: clean(req.evidence),
            verifier_id: user.user_id,
            verifier_type: VerifierType::from(user.role),
        })
        .await?;

    info!(
        verification_id = %verification.id,
        target_id = %verification.target_id,
        target_type = %verification.target_type,
        verifier_id = %user.user_id,
        "Verification recorded"
    );

    Ok((StatusCode::CREATED, Json(verification)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_common::db::models::UserRole;
    use serde_json::json;

    fn user(role: UserRole) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "v@example.org".to_string(),
            role,
            journalist_id: None,
        }
    }

    #[test]
    fn test_journalists_scoped_to_own_verifications() {
        let journalist = user(UserRole::Journalist);
        let filter = scoped_filter(&journalist, &ListVerificationsQuery::default());
        assert_eq!(filter.verifier_id, Some(journalist.user_id));

        for role in [UserRole::Public, UserRole::Moderator, UserRole::Admin] {
            let filter = scoped_filter(&user(role), &ListVerificationsQuery::default());
            assert_eq!(filter.verifier_id, None);
        }
    }

    #[test]
    fn test_confidence_bounds() {
        let parse = |confidence: i32| -> CreateVerificationRequest {
            serde_json::from_value(json!({
                "target_id": Uuid::new_v4(),
                "target_type": "DOCUMENT",
                "status": "VERIFIED",
                "confidence": confidence,
            }))
            .unwrap()
        };

        assert!(parse(1).validate().is_ok());
        assert!(parse(100).validate().is_ok());
        assert!(parse(0).validate().is_err());
        assert!(parse(101).validate().is_err());
    }

    #[test]
    fn test_confidence_is_optional() {
        let req: CreateVerificationRequest = serde_json::from_value(json!({
            "target_id": Uuid::new_v4(),
            "target_type": "CASE",
            "status": "PENDING",
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.target_type, VerificationTarget::Case);
    }
}
