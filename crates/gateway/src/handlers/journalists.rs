//! Journalist profile handlers

use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{log_fan_out_failure, UserSummary};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use casefile_common::{
    auth::AuthUser,
    db::models::{Case, JournalistProfile, MembershipTier, NotificationType, User, VerificationStatus},
    db::{JournalistFilter, Page, Pagination, ProfileUpdateFields, Repository},
    errors::{AppError, Result},
    notifications::{Announcement, JOURNALIST_ENTITY},
};

const DEFAULT_LIMIT: u64 = 12;
const RECENT_CASES: u64 = 6;

#[derive(Debug, Default, Deserialize)]
pub struct ListJournalistsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub specialization: Option<String>,
    pub location: Option<String>,
    /// `verified` or `unverified`
    pub verification: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JournalistSummary {
    #[serde(flatten)]
    pub profile: JournalistProfile,
    pub user: Option<UserSummary>,
    pub case_count: u64,
    pub mentee_count: u64,
}

#[derive(Debug, Serialize)]
pub struct JournalistListResponse {
    pub journalists: Vec<JournalistSummary>,
    pub pagination: Pagination,
}

/// Another journalist, by name
#[derive(Debug, Serialize)]
pub struct JournalistRef {
    pub id: Uuid,
    pub name: Option<String>,
}

impl JournalistRef {
    fn new(profile: &JournalistProfile, user: Option<&User>) -> Self {
        Self {
            id: profile.id,
            name: user.map(|u| u.display_name().to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JournalistCounts {
    pub cases: u64,
    pub mentees: u64,
}

#[derive(Debug, Serialize)]
pub struct JournalistDetail {
    #[serde(flatten)]
    pub profile: JournalistProfile,
    pub user: Option<UserSummary>,
    pub mentor: Option<JournalistRef>,
    pub mentees: Vec<JournalistRef>,
    pub recent_cases: Vec<Case>,
    pub counts: JournalistCounts,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 5000))]
    pub bio: Option<String>,
    #[validate(length(max = 5000))]
    pub experience: Option<String>,
    #[validate(length(max = 200))]
    pub specialization: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 200))]
    pub languages: Option<String>,
    #[validate(url)]
    pub website: Option<String>,
    #[validate(length(max = 1000))]
    pub social_media: Option<String>,
}

impl From<UpdateProfileRequest> for ProfileUpdateFields {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            bio: req.bio,
            experience: req.experience,
            specialization: req.specialization,
            location: req.location,
            languages: req.languages,
            website: req.website,
            social_media: req.social_media,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetVerificationRequest {
    pub status: VerificationStatus,
    pub tier: Option<MembershipTier>,
}

fn verification_filter(value: Option<&str>) -> Result<Option<bool>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some("verified") => Ok(Some(true)),
        Some("unverified") => Ok(Some(false)),
        Some(other) => Err(AppError::InvalidFormat {
            message: format!(
                "verification must be 'verified' or 'unverified', got '{}'",
                other
            ),
        }),
    }
}

async fn find_profile(repo: &Repository, id: Uuid) -> Result<JournalistProfile> {
    repo.find_profile_by_id(id)
        .await?
        .ok_or_else(|| AppError::JournalistNotFound { id: id.to_string() })
}

async fn own_profile(repo: &Repository, user: &AuthUser) -> Result<JournalistProfile> {
    repo.find_profile_by_user_id(user.user_id)
        .await?
        .ok_or_else(|| AppError::JournalistNotFound {
            id: user.user_id.to_string(),
        })
}

async fn journalist_detail(
    repo: &Repository,
    profile: JournalistProfile,
    user: Option<User>,
) -> Result<JournalistDetail> {
    let ids = [profile.id];

    let (mentor, mentees, recent_cases, case_counts) = futures::try_join!(
        async {
            match profile.mentor_id {
                Some(mentor_id) => repo.find_profile_with_user(mentor_id).await,
                None => Ok(None),
            }
        },
        repo.mentees_of(profile.id),
        repo.recent_public_cases_by(profile.id, RECENT_CASES),
        repo.count_cases_by_journalist(&ids),
    )?;

    let mentees: Vec<JournalistRef> = mentees
        .iter()
        .map(|(p, u)| JournalistRef::new(p, u.as_ref()))
        .collect();

    Ok(JournalistDetail {
        user: user.as_ref().map(UserSummary::from),
        mentor: mentor.map(|(p, u)| JournalistRef::new(&p, u.as_ref())),
        counts: JournalistCounts {
            cases: case_counts.get(&profile.id).copied().unwrap_or(0),
            mentees: mentees.len() as u64,
        },
        mentees,
        recent_cases,
        profile,
    })
}

async fn detail_with_user(repo: &Repository, profile: JournalistProfile) -> Result<JournalistDetail> {
    let user = repo.find_user_by_id(profile.user_id).await?;
    journalist_detail(repo, profile, user).await
}

/// Directory of journalists
pub async fn list_journalists(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListJournalistsQuery>,
) -> Result<Json<JournalistListResponse>> {
    let repo = state.repo();
    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT);

    let filter = JournalistFilter {
        search: query.search,
        specialization: query.specialization,
        location: query.location,
        verified: verification_filter(query.verification.as_deref())?,
    };

    let (rows, total) = repo.list_journalists(&filter, page).await?;
    let ids: Vec<Uuid> = rows.iter().map(|(p, _)| p.id).collect();

    let (case_counts, mentee_counts): (HashMap<Uuid, u64>, HashMap<Uuid, u64>) = futures::try_join!(
        repo.count_cases_by_journalist(&ids),
        repo.count_mentees(&ids),
    )?;

    let journalists = rows
        .into_iter()
        .map(|(profile, user)| JournalistSummary {
            user: user.as_ref().map(UserSummary::from),
            case_count: case_counts.get(&profile.id).copied().unwrap_or(0),
            mentee_count: mentee_counts.get(&profile.id).copied().unwrap_or(0),
            profile,
        })
        .collect();

    Ok(Json(JournalistListResponse {
        journalists,
        pagination: page.pagination(total),
    }))
}

/// Public profile
pub async fn get_journalist(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<JournalistDetail>> {
    let repo = state.repo();
    let (profile, user) = repo
        .find_profile_with_user(id)
        .await?
        .ok_or_else(|| AppError::JournalistNotFound { id: id.to_string() })?;

    Ok(Json(journalist_detail(&repo, profile, user).await?))
}

/// Edit a profile; the owner or staff
pub async fn update_journalist(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<JournalistProfile>> {
    let repo = state.repo();
    let profile = find_profile(&repo, id).await?;

    if profile.user_id != user.user_id && !user.is_staff() {
        return Err(AppError::forbidden("You can only edit your own profile"));
    }

    let updated = repo.update_profile(profile, req.into()).await?;
    info!(journalist_id = %updated.id, user_id = %user.user_id, "Profile updated");

    Ok(Json(updated))
}

/// The caller's own profile
pub async fn get_my_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<JournalistDetail>> {
    let repo = state.repo();
    let profile = own_profile(&repo, &user).await?;
    Ok(Json(detail_with_user(&repo, profile).await?))
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<JournalistProfile>> {
    let repo = state.repo();
    let profile = own_profile(&repo, &user).await?;

    let updated = repo.update_profile(profile, req.into()).await?;
    info!(journalist_id = %updated.id, "Own profile updated");

    Ok(Json(updated))
}

/// Staff moderation of a journalist's verification state
pub async fn set_verification(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SetVerificationRequest>,
) -> Result<Json<JournalistProfile>> {
    user.require_staff("moderate journalists")?;

    let repo = state.repo();
    let profile = find_profile(&repo, id).await?;
    let was_verified = profile.is_verified;

    let updated = repo
        .set_profile_verification(profile, req.status, req.tier)
        .await?;

    info!(
        journalist_id = %updated.id,
        status = %req.status,
        moderator_id = %user.user_id,
        "Journalist verification changed"
    );

    if updated.is_verified && !was_verified {
        let announcement = Announcement::new(
            NotificationType::JournalistVerified,
            "You are verified",
            "Your journalist profile has been verified.",
        )
        .with_data(json!({ "journalist_id": updated.id, "tier": updated.membership_tier }));

        log_fan_out_failure(
            state
                .notifier
                .notify_user(
                    updated.user_id,
                    &announcement,
                    Some((updated.id, JOURNALIST_ENTITY)),
                )
                .await,
            "journalist_verified",
        );
    }

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_filter() {
        assert_eq!(verification_filter(None).unwrap(), None);
        assert_eq!(verification_filter(Some("")).unwrap(), None);
        assert_eq!(verification_filter(Some("verified")).unwrap(), Some(true));
        assert_eq!(verification_filter(Some("unverified")).unwrap(), Some(false));

        let err = verification_filter(Some("maybe")).unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
    }

    #[test]
    fn test_profile_website_must_be_url() {
        let req = UpdateProfileRequest {
            website: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(req.validate().unwrap_err().field_errors().contains_key("website"));

        let req = UpdateProfileRequest {
            website: Some("https://reporter.example".to_string()),
            bio: Some("Covers land records".to_string()),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_set_verification_parses() {
        let req: SetVerificationRequest =
            serde_json::from_value(json!({ "status": "VERIFIED", "tier": "SENIOR" })).unwrap();
        assert_eq!(req.status, VerificationStatus::Verified);
        assert_eq!(req.tier, Some(MembershipTier::Senior));
    }
}
