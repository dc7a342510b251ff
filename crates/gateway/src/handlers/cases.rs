//! Case handlers
//!
//! Cases are the central record: a journalist's investigation with its
//! timeline, sources, progress updates, reader comments and documents.
//! Visibility and edit rules come from `Viewer`; every list query is
//! filtered in SQL, every single-record read is checked here.

use std::collections::{HashMap, HashSet};

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{clean, log_fan_out_failure, required, MessageResponse};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use casefile_common::{
    auth::{AuthUser, MaybeAuthUser, Viewer},
    db::models::{
        Case, CaseSource, CaseStatus, CaseSubscription, CaseUpdate, Comment, Document,
        NotificationType, Priority, TimelineEvent, User, UserRole,
    },
    db::{AuthorSummary, CaseCounts, CaseFilter, CaseUpdateFields, NewCase, Page, Pagination, Repository},
    errors::{AppError, Result},
    notifications::{Announcement, CASE_ENTITY},
    slug::unique_slug,
};

const DEFAULT_LIMIT: u64 = 10;

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListCasesQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<CaseStatus>,
    pub journalist_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CaseSummary {
    #[serde(flatten)]
    pub case: Case,
    pub author: Option<AuthorSummary>,
    pub counts: CaseCounts,
}

#[derive(Debug, Serialize)]
pub struct CaseListResponse {
    pub cases: Vec<CaseSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCaseRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,

    #[validate(length(min = 1))]
    pub description: String,

    pub content: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub category: String,

    pub tags: Option<String>,

    #[validate(length(max = 200))]
    pub location: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub is_public: bool,

    /// Admins may file a case on behalf of a journalist
    pub journalist_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCaseRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: Option<String>,

    #[validate(length(min = 1))]
    pub description: Option<String>,

    pub content: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,

    pub tags: Option<String>,

    #[validate(length(max = 200))]
    pub location: Option<String>,

    pub priority: Option<Priority>,
    pub status: Option<CaseStatus>,
    pub is_public: Option<bool>,
}

/// A child record with the display name of the user who wrote it
#[derive(Debug, Serialize)]
pub struct Authored<T> {
    #[serde(flatten)]
    pub item: T,
    pub author_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaseDetail {
    #[serde(flatten)]
    pub case: Case,
    pub author: Option<AuthorSummary>,
    pub timeline: Vec<TimelineEvent>,
    pub documents: Vec<Document>,
    pub sources: Vec<CaseSource>,
    pub updates: Vec<Authored<CaseUpdate>>,
    pub comments: Vec<Authored<Comment>>,
    pub counts: CaseCounts,
    pub can_edit: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TimelineEventRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<FixedOffset>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SourceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 500))]
    pub contact: Option<String>,
    #[serde(default)]
    pub is_confidential: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CaseUpdateRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

// ============================================================================
// Shared lookups
// ============================================================================

async fn find_case(repo: &Repository, id: Uuid) -> Result<Case> {
    repo.find_case_by_id(id)
        .await?
        .ok_or_else(|| AppError::CaseNotFound { id: id.to_string() })
}

fn ensure_visible(case: &Case, viewer: &Viewer) -> Result<()> {
    if viewer.can_view(case.is_public, case.journalist_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("This case is not public"))
    }
}

fn ensure_editable(case: &Case, viewer: &Viewer) -> Result<()> {
    if viewer.can_edit_case(case.journalist_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("Only the owning journalist or staff can change this case"))
    }
}

/// Case the signed-in user may see
async fn visible_case(repo: &Repository, id: Uuid, user: &AuthUser) -> Result<Case> {
    let case = find_case(repo, id).await?;
    ensure_visible(&case, &user.viewer())?;
    Ok(case)
}

/// Case the signed-in user may change
async fn editable_case(repo: &Repository, id: Uuid, user: &AuthUser) -> Result<Case> {
    let case = find_case(repo, id).await?;
    ensure_editable(&case, &user.viewer())?;
    Ok(case)
}

/// Journalist profile a new case is filed under
async fn owning_journalist(
    repo: &Repository,
    user: &AuthUser,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>> {
    if user.role == UserRole::Admin {
        return match requested {
            Some(id) => repo
                .find_profile_by_id(id)
                .await?
                .map(|p| Some(p.id))
                .ok_or_else(|| AppError::JournalistNotFound { id: id.to_string() }),
            None => Ok(None),
        };
    }

    if let Some(id) = user.journalist_id {
        return Ok(Some(id));
    }

    repo.find_profile_by_user_id(user.user_id)
        .await?
        .map(|p| Some(p.id))
        .ok_or_else(|| AppError::JournalistNotFound {
            id: user.user_id.to_string(),
        })
}

fn author_ids(cases: &[Case]) -> Vec<Uuid> {
    let unique: HashSet<Uuid> = cases.iter().filter_map(|c| c.journalist_id).collect();
    unique.into_iter().collect()
}

async fn summarize(repo: &Repository, cases: Vec<Case>) -> Result<Vec<CaseSummary>> {
    let ids: Vec<Uuid> = cases.iter().map(|c| c.id).collect();
    let authors = author_ids(&cases);

    let (counts, authors) = futures::try_join!(
        repo.case_counts(&ids),
        repo.authors_by_profile_ids(&authors),
    )?;

    Ok(cases
        .into_iter()
        .map(|case| CaseSummary {
            author: case.journalist_id.and_then(|id| authors.get(&id).cloned()),
            counts: counts_for(&counts, case.id),
            case,
        })
        .collect())
}

fn authored<T>(items: Vec<T>, users: &HashMap<Uuid, User>, author_of: impl Fn(&T) -> Uuid) -> Vec<Authored<T>> {
    items
        .into_iter()
        .map(|item| Authored {
            author_name: users.get(&author_of(&item)).map(|u| u.display_name().to_string()),
            item,
        })
        .collect()
}

/// Totals over every row of the case, private documents included, so the
/// list and the detail view agree
fn counts_for(counts: &HashMap<Uuid, CaseCounts>, case_id: Uuid) -> CaseCounts {
    counts.get(&case_id).copied().unwrap_or_default()
}

/// Non-editors never see a confidential source's contact
fn redact_sources(sources: &mut [CaseSource], can_edit: bool) {
    if can_edit {
        return;
    }
    for source in sources.iter_mut().filter(|s| s.is_confidential) {
        source.contact = None;
    }
}

async fn case_detail(repo: &Repository, case: Case, viewer: &Viewer) -> Result<CaseDetail> {
    ensure_visible(&case, viewer)?;
    let can_edit = viewer.can_edit_case(case.journalist_id);
    let owner: Vec<Uuid> = case.journalist_id.into_iter().collect();
    let case_ids = [case.id];

    let (timeline, documents, mut sources, updates, comments, authors, counts) = futures::try_join!(
        repo.timeline_for_case(case.id),
        repo.documents_for_case(case.id, can_edit),
        repo.sources_for_case(case.id),
        repo.updates_for_case(case.id),
        repo.comments_for_case(case.id),
        repo.authors_by_profile_ids(&owner),
        repo.case_counts(&case_ids),
    )?;

    redact_sources(&mut sources, can_edit);

    let writer_ids: Vec<Uuid> = updates
        .iter()
        .map(|u| u.author_id)
        .chain(comments.iter().map(|c| c.user_id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let writers = repo.users_by_ids(&writer_ids).await?;

    Ok(CaseDetail {
        author: case.journalist_id.and_then(|id| authors.get(&id).cloned()),
        timeline,
        documents,
        sources,
        updates: authored(updates, &writers, |u| u.author_id),
        comments: authored(comments, &writers, |c| c.user_id),
        counts: counts_for(&counts, case.id),
        can_edit,
        case,
    })
}

/// Announcement for an edit, and whether the edit published the case
fn edit_announcement(case: &Case, just_published: bool) -> Announcement {
    if just_published {
        Announcement::new(
            NotificationType::CasePublished,
            "Case published",
            format!("\"{}\" has been published", case.title),
        )
    } else {
        Announcement::new(
            NotificationType::CaseUpdated,
            "Case updated",
            format!("\"{}\" has been updated", case.title),
        )
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List cases visible to the caller
pub async fn list_cases(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ApiQuery(query): ApiQuery<ListCasesQuery>,
) -> Result<Json<CaseListResponse>> {
    let repo = state.repo();
    let viewer = Viewer::from(&user);
    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT);

    let filter = CaseFilter {
        search: query.search,
        category: query.category,
        status: query.status,
        journalist_id: query.journalist_id,
    };

    let (cases, total) = repo.list_cases(&filter, &viewer, page).await?;
    let cases = summarize(&repo, cases).await?;

    Ok(Json(CaseListResponse {
        cases,
        pagination: page.pagination(total),
    }))
}

/// Open a new case
pub async fn create_case(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateCaseRequest>,
) -> Result<(StatusCode, Json<Case>)> {
    user.require_role(&[UserRole::Journalist, UserRole::Admin], "create cases")?;

    let repo = state.repo();
    let title = required(req.title, "title")?;
    let description = required(req.description, "description")?;
    let category = required(req.category, "category")?;

    let journalist_id = owning_journalist(&repo, &user, req.journalist_id).await?;
    let slug = unique_slug(&repo, &title, None).await?;

    let case = repo
        .create_case(NewCase {
            journalist_id,
            title,
            slug,
            description,
            content: clean(req.content),
            category,
            tags: clean(req.tags),
            location: clean(req.location),
            priority: req.priority,
            is_public: req.is_public,
        })
        .await?;

    info!(case_id = %case.id, slug = %case.slug, user_id = %user.user_id, "Case created");

    if case.is_public {
        let announcement = Announcement::new(
            NotificationType::CasePublished,
            "New public case",
            format!("\"{}\" was published", case.title),
        )
        .with_data(json!({ "case_id": case.id, "case_slug": case.slug }));

        log_fan_out_failure(
            state
                .notifier
                .notify_staff(&announcement, Some((case.id, CASE_ENTITY)))
                .await,
            "case_published",
        );
    }

    Ok((StatusCode::CREATED, Json(case)))
}

/// Full case detail by id
pub async fn get_case(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CaseDetail>> {
    let repo = state.repo();
    let case = find_case(&repo, id).await?;
    Ok(Json(case_detail(&repo, case, &Viewer::from(&user)).await?))
}

/// Full case detail by slug
pub async fn get_case_by_slug(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<CaseDetail>> {
    let repo = state.repo();
    let case = repo
        .find_case_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::CaseNotFound { id: slug.clone() })?;
    Ok(Json(case_detail(&repo, case, &Viewer::from(&user)).await?))
}

/// Partial update
pub async fn update_case(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateCaseRequest>,
) -> Result<Json<Case>> {
    let repo = state.repo();
    let case = editable_case(&repo, id, &user).await?;

    let was_published = case.case_status() == CaseStatus::Published;
    let just_published = req.status == Some(CaseStatus::Published) && !was_published;

    let title = req.title.map(|t| required(t, "title")).transpose()?;
    let slug = match &title {
        Some(title) if *title != case.title => Some(unique_slug(&repo, title, Some(case.id)).await?),
        _ => None,
    };

    let fields = CaseUpdateFields {
        title,
        slug,
        description: req.description.map(|d| required(d, "description")).transpose()?,
        content: req.content,
        category: req.category.map(|c| required(c, "category")).transpose()?,
        tags: req.tags,
        location: req.location,
        priority: req.priority,
        status: req.status,
        is_public: req.is_public,
        published_at: just_published.then(|| Utc::now().into()),
    };

    let updated = repo.update_case(case, fields).await?;

    info!(
        case_id = %updated.id,
        status = %updated.status,
        just_published,
        "Case updated"
    );

    log_fan_out_failure(
        state
            .notifier
            .notify_case_subscribers(&updated, &edit_announcement(&updated, just_published))
            .await,
        "case_updated",
    );

    Ok(Json(updated))
}

/// Delete a case and everything attached to it
pub async fn delete_case(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    let repo = state.repo();
    let case = editable_case(&repo, id, &user).await?;

    if !repo.delete_case(case.id).await? {
        return Err(AppError::CaseNotFound { id: id.to_string() });
    }

    info!(case_id = %id, user_id = %user.user_id, "Case deleted");
    Ok(Json(MessageResponse::new("Case deleted")))
}

/// Add a dated event to the case timeline
pub async fn add_timeline_event(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<TimelineEventRequest>,
) -> Result<(StatusCode, Json<TimelineEvent>)> {
    let repo = state.repo();
    let case = editable_case(&repo, id, &user).await?;

    let event = repo
        .add_timeline_event(
            case.id,
            required(req.title, "title")?,
            clean(req.description),
            req.event_date,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Record a source
pub async fn add_source(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SourceRequest>,
) -> Result<(StatusCode, Json<CaseSource>)> {
    let repo = state.repo();
    let case = editable_case(&repo, id, &user).await?;

    let source = repo
        .add_case_source(
            case.id,
            required(req.name, "name")?,
            clean(req.description),
            clean(req.contact),
            req.is_confidential,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(source)))
}

/// Post a progress update and tell subscribers
pub async fn add_update(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CaseUpdateRequest>,
) -> Result<(StatusCode, Json<CaseUpdate>)> {
    let repo = state.repo();
    let case = editable_case(&repo, id, &user).await?;

    let update = repo
        .add_case_update(
            case.id,
            user.user_id,
            required(req.title, "title")?,
            required(req.content, "content")?,
        )
        .await?;

    let announcement = Announcement::new(
        NotificationType::CaseUpdated,
        format!("New update: {}", update.title),
        format!("\"{}\" has a new update", case.title),
    )
    .with_data(json!({ "update_id": update.id }));

    log_fan_out_failure(
        state
            .notifier
            .notify_case_subscribers(&case, &announcement)
            .await,
        "case_update_added",
    );

    Ok((StatusCode::CREATED, Json(update)))
}

/// Comment on a case the caller can see
pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let repo = state.repo();
    let case = visible_case(&repo, id, &user).await?;

    let comment = repo
        .add_comment(case.id, user.user_id, required(req.content, "content")?)
        .await?;

    if let Some(journalist_id) = case.journalist_id {
        let owner = repo.find_profile_by_id(journalist_id).await?;
        if let Some(owner) = owner.filter(|p| p.user_id != user.user_id) {
            let announcement = Announcement::new(
                NotificationType::CaseComment,
                "New comment",
                format!("Someone commented on \"{}\"", case.title),
            )
            .with_data(json!({
                "case_id": case.id,
                "case_slug": case.slug,
                "comment_id": comment.id,
            }));

            log_fan_out_failure(
                state
                    .notifier
                    .notify_user(owner.user_id, &announcement, Some((case.id, CASE_ENTITY)))
                    .await,
                "case_comment",
            );
        }
    }

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Follow a case
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CaseSubscription>> {
    let repo = state.repo();
    let case = visible_case(&repo, id, &user).await?;

    let subscription = repo.subscribe_to_case(case.id, user.user_id).await?;
    info!(case_id = %case.id, user_id = %user.user_id, "Subscribed to case");

    Ok(Json(subscription))
}

/// Stop following a case
pub async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    let repo = state.repo();
    let case = visible_case(&repo, id, &user).await?;

    if !repo.unsubscribe_from_case(case.id, user.user_id).await? {
        return Err(AppError::not_found("case subscription", case.id));
    }

    Ok(Json(MessageResponse::new("Unsubscribed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(journalist_id: Option<Uuid>, is_public: bool) -> Case {
        let now = Utc::now().into();
        Case {
            id: Uuid::new_v4(),
            journalist_id,
            title: "Missing ration cards".to_string(),
            slug: "missing-ration-cards".to_string(),
            description: "d".to_string(),
            content: None,
            category: "welfare".to_string(),
            tags: None,
            location: None,
            priority: Priority::High.to_string(),
            status: CaseStatus::InProgress.to_string(),
            is_public,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn source(confidential: bool) -> CaseSource {
        CaseSource {
            id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            name: "Clerk".to_string(),
            description: None,
            contact: Some("+91 00000".to_string()),
            is_confidential: confidential,
            created_at: Utc::now().into(),
        }
    }

    fn viewer(role: UserRole, journalist_id: Option<Uuid>) -> Viewer {
        Viewer {
            user_id: Some(Uuid::new_v4()),
            role: Some(role),
            journalist_id,
        }
    }

    #[test]
    fn test_private_case_hidden_from_public_and_other_journalists() {
        let owner = Uuid::new_v4();
        let c = case(Some(owner), false);

        assert!(ensure_visible(&c, &Viewer::anonymous()).is_err());
        assert!(ensure_visible(&c, &viewer(UserRole::Public, None)).is_err());
        assert!(ensure_visible(&c, &viewer(UserRole::Journalist, Some(Uuid::new_v4()))).is_err());
        assert!(ensure_visible(&c, &viewer(UserRole::Journalist, Some(owner))).is_ok());
        assert!(ensure_visible(&c, &viewer(UserRole::Moderator, None)).is_ok());
    }

    #[test]
    fn test_only_owner_and_staff_edit() {
        let owner = Uuid::new_v4();
        let c = case(Some(owner), true);

        let err = ensure_editable(&c, &viewer(UserRole::Journalist, Some(Uuid::new_v4()))).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(ensure_editable(&c, &viewer(UserRole::Journalist, Some(owner))).is_ok());
        assert!(ensure_editable(&c, &viewer(UserRole::Admin, None)).is_ok());
    }

    #[test]
    fn test_unowned_case_is_staff_only() {
        let c = case(None, true);
        assert!(ensure_editable(&c, &viewer(UserRole::Journalist, None)).is_err());
        assert!(ensure_editable(&c, &viewer(UserRole::Moderator, None)).is_ok());
    }

    #[test]
    fn test_confidential_contacts_redacted_for_readers() {
        let mut sources = vec![source(true), source(false)];
        redact_sources(&mut sources, false);
        assert_eq!(sources[0].contact, None);
        assert!(sources[1].contact.is_some());

        let mut sources = vec![source(true)];
        redact_sources(&mut sources, true);
        assert!(sources[0].contact.is_some());
    }

    #[test]
    fn test_edit_announcement_kind() {
        let c = case(None, true);
        assert_eq!(edit_announcement(&c, true).kind, NotificationType::CasePublished);
        assert_eq!(edit_announcement(&c, false).kind, NotificationType::CaseUpdated);
    }

    #[test]
    fn test_author_ids_are_unique() {
        let j = Uuid::new_v4();
        let cases = vec![case(Some(j), true), case(Some(j), true), case(None, true)];
        assert_eq!(author_ids(&cases), vec![j]);
    }

    #[test]
    fn test_authored_attaches_names() {
        let now = Utc::now().into();
        let user = User {
            id: Uuid::new_v4(),
            email: "reader@example.org".to_string(),
            password_hash: String::new(),
            name: None,
            role: "PUBLIC".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let comment = Comment {
            id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            user_id: user.id,
            content: "Following".to_string(),
            created_at: now,
        };
        let users = HashMap::from([(user.id, user)]);

        let out = authored(vec![comment], &users, |c| c.user_id);
        assert_eq!(out[0].author_name.as_deref(), Some("reader@example.org"));

        let json = serde_json::to_value(&out[0]).unwrap();
        assert_eq!(json["content"], "Following");
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateCaseRequest = serde_json::from_value(json!({
            "title": "Bridge collapse",
            "description": "Inquiry",
            "category": "infrastructure",
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.priority, Priority::Medium);
        assert!(!req.is_public);
    }

    #[test]
    fn test_list_query_parses_status() {
        let query: ListCasesQuery =
            serde_json::from_value(json!({ "status": "UNDER_REVIEW", "page": 2 })).unwrap();
        assert_eq!(query.status, Some(CaseStatus::UnderReview));
        assert_eq!(query.page, Some(2));
    }

    #[test]
    fn test_counts_are_case_totals() {
        let id = Uuid::new_v4();
        let totals = CaseCounts {
            documents: 3,
            comments: 2,
            updates: 1,
            timeline_events: 4,
        };
        let counts = HashMap::from([(id, totals)]);

        assert_eq!(counts_for(&counts, id), totals);
        assert_eq!(counts_for(&counts, Uuid::new_v4()), CaseCounts::default());
    }
}
