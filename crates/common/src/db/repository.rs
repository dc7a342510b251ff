//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::auth::Viewer;
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::queue::INTERRUPTED_ERROR;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait, UpdateMany,
};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Pagination
// ============================================================================

/// One-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub const MAX_LIMIT: u64 = 100;

    /// Build from optional query values; page is at least 1 and limit is
    /// clamped to 1..=MAX_LIMIT.
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Zero-based index for the SeaORM paginator
    fn index(&self) -> u64 {
        self.page - 1
    }

    pub fn offset(&self) -> u64 {
        self.index() * self.limit
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }

    pub fn pagination(&self, total: u64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            pages: self.total_pages(total),
        }
    }
}

/// Pagination block returned alongside list results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

// ============================================================================
// Query inputs
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<CaseStatus>,
    pub journalist_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewCase {
    pub journalist_id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub content: Option<String>,
    pub category: String,
    pub tags: Option<String>,
    pub location: Option<String>,
    pub priority: Priority,
    pub is_public: bool,
}

/// Partial case update; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct CaseUpdateFields {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub location: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<CaseStatus>,
    pub is_public: Option<bool>,
    pub published_at: Option<DateTimeWithTimeZone>,
}

/// Per-case child counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaseCounts {
    pub documents: u64,
    pub comments: u64,
    pub updates: u64,
    pub timeline_events: u64,
}

/// Journalist name block attached to cases
#[derive(Debug, Clone, Serialize)]
pub struct AuthorSummary {
    pub journalist_id: Uuid,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub case_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub case_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub document_type: DocumentType,
    pub is_public: bool,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentUpdateFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub document_type: Option<DocumentType>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct JournalistFilter {
    pub search: Option<String>,
    pub specialization: Option<String>,
    pub location: Option<String>,
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdateFields {
    pub bio: Option<String>,
    pub experience: Option<String>,
    pub specialization: Option<String>,
    pub location: Option<String>,
    pub languages: Option<String>,
    pub website: Option<String>,
    pub social_media: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub priority: NotificationPriority,
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewEmail {
    pub to_address: String,
    pub subject: String,
    pub html_content: String,
    pub text_content: Option<String>,
    pub template_id: Option<String>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationFilter {
    pub target_id: Option<Uuid>,
    pub target_type: Option<VerificationTarget>,
    /// Restrict to one verifier's records
    pub verifier_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewVerification {
    pub target_id: Uuid,
    pub target_type: VerificationTarget,
    pub status: VerificationStatus,
    pub confidence: Option<i32>,
    pub notes: Option<String>,
    pub evidence: Option<String>,
    pub verifier_id: Uuid,
    pub verifier_type: VerifierType,
}

// ============================================================================
// Query helpers
// ============================================================================

/// Case-insensitive substring match on a column. `%` and `_` in the
/// needle match literally.
fn contains_ci<C: ColumnTrait>(col: C, needle: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&needle.trim().to_lowercase()));
    Expr::expr(Func::lower(Expr::col((col.entity_name(), col))))
        .like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
}

const LIKE_ESCAPE: char = '\\';

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Rows of the cases table the viewer may see
fn case_visibility(viewer: &Viewer) -> Condition {
    if viewer.is_staff() {
        return Condition::all();
    }

    let mut cond = Condition::any().add(CaseColumn::IsPublic.eq(true));
    if viewer.role == Some(UserRole::Journalist) {
        if let Some(journalist_id) = viewer.journalist_id {
            cond = cond.add(CaseColumn::JournalistId.eq(journalist_id));
        }
    }
    cond
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// SENDING rows untouched since `stale_before` move to `status` with one
/// more attempt on record
fn release_stale_update(
    stale_before: DateTimeWithTimeZone,
    status: EmailStatus,
) -> UpdateMany<EmailQueueEntity> {
    EmailQueueEntity::update_many()
        .col_expr(EmailQueueColumn::Status, Expr::value(status))
        .col_expr(
            EmailQueueColumn::Attempts,
            Expr::col(EmailQueueColumn::Attempts).add(1),
        )
        .col_expr(
            EmailQueueColumn::Error,
            Expr::value(Some(INTERRUPTED_ERROR.to_string())),
        )
        .col_expr(EmailQueueColumn::UpdatedAt, Expr::value(now()))
        .filter(EmailQueueColumn::Status.eq(EmailStatus::Sending))
        .filter(EmailQueueColumn::UpdatedAt.lt(stale_before))
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Grouped counts
    // ========================================================================

    /// Row counts per value of a UUID column, restricted to `ids`
    async fn count_grouped<E>(&self, col: E::Column, ids: &[Uuid]) -> Result<HashMap<Uuid, u64>>
    where
        E: EntityTrait,
    {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, i64)> = E::find()
            .select_only()
            .column(col)
            .column_as(Expr::col((col.entity_name(), col)).count(), "count")
            .filter(col.is_in(ids.iter().copied()))
            .group_by(col)
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, count)| (id, count.max(0) as u64))
            .collect())
    }

    /// Row counts per value of a text column
    async fn count_by_text<E>(&self, col: E::Column) -> Result<Vec<(String, u64)>>
    where
        E: EntityTrait,
    {
        let rows: Vec<(String, i64)> = E::find()
            .select_only()
            .column(col)
            .column_as(Expr::col((col.entity_name(), col)).count(), "count")
            .group_by(col)
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(value, count)| (value, count.max(0) as u64))
            .collect())
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn users_by_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = UserEntity::find()
            .filter(UserColumn::Id.is_in(ids.iter().copied()))
            .all(self.conn())
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    /// Create an account. Journalists get an ASSOCIATE / PENDING profile
    /// in the same transaction.
    pub async fn register_user(
        &self,
        email: &str,
        password_hash: String,
        name: Option<String>,
        role: UserRole,
    ) -> Result<(User, Option<JournalistProfile>)> {
        let txn = self.conn().begin().await?;
        let now = now();

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            name: Set(name),
            role: Set(role.into()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateEmail {
                    email: email.to_string(),
                }
            } else {
                AppError::Database(e)
            }
        })?;

        let profile = if role == UserRole::Journalist {
            let profile = JournalistProfileActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.id),
                bio: Set(None),
                experience: Set(None),
                specialization: Set(None),
                location: Set(None),
                languages: Set(None),
                website: Set(None),
                social_media: Set(None),
                membership_tier: Set(MembershipTier::Associate.into()),
                verification_status: Set(VerificationStatus::Pending.into()),
                is_verified: Set(false),
                mentor_id: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            Some(profile)
        } else {
            None
        };

        txn.commit().await?;

        Ok((user, profile))
    }

    /// Ids of active moderators and admins
    pub async fn active_staff_ids(&self) -> Result<Vec<Uuid>> {
        let staff: Vec<Uuid> = UserEntity::find()
            .select_only()
            .column(UserColumn::Id)
            .filter(UserColumn::IsActive.eq(true))
            .filter(UserColumn::Role.is_in([UserRole::Moderator, UserRole::Admin]))
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(staff)
    }

    pub async fn recent_users(&self, limit: u64) -> Result<Vec<User>> {
        UserEntity::find()
            .order_by_desc(UserColumn::CreatedAt)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_users(&self) -> Result<u64> {
        UserEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Journalist Profile Operations
    // ========================================================================

    pub async fn find_profile_by_id(&self, id: Uuid) -> Result<Option<JournalistProfile>> {
        JournalistProfileEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_profile_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<JournalistProfile>> {
        JournalistProfileEntity::find()
            .filter(JournalistProfileColumn::UserId.eq(user_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_profile_with_user(
        &self,
        id: Uuid,
    ) -> Result<Option<(JournalistProfile, Option<User>)>> {
        JournalistProfileEntity::find_by_id(id)
            .find_also_related(UserEntity)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// List journalist profiles with their accounts, newest first
    pub async fn list_journalists(
        &self,
        filter: &JournalistFilter,
        page: Page,
    ) -> Result<(Vec<(JournalistProfile, Option<User>)>, u64)> {
        let mut query = JournalistProfileEntity::find().find_also_related(UserEntity);

        if let Some(search) = non_empty(&filter.search) {
            query = query.filter(
                Condition::any()
                    .add(contains_ci(UserColumn::Name, search))
                    .add(contains_ci(JournalistProfileColumn::Bio, search))
                    .add(contains_ci(JournalistProfileColumn::Specialization, search)),
            );
        }
        if let Some(specialization) = non_empty(&filter.specialization) {
            query = query.filter(contains_ci(
                JournalistProfileColumn::Specialization,
                specialization,
            ));
        }
        if let Some(location) = non_empty(&filter.location) {
            query = query.filter(contains_ci(JournalistProfileColumn::Location, location));
        }
        if let Some(verified) = filter.verified {
            query = query.filter(JournalistProfileColumn::IsVerified.eq(verified));
        }

        let paginator = query
            .order_by_desc(JournalistProfileColumn::CreatedAt)
            .paginate(self.conn(), page.limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;

        Ok((items, total))
    }

    pub async fn update_profile(
        &self,
        profile: JournalistProfile,
        fields: ProfileUpdateFields,
    ) -> Result<JournalistProfile> {
        let mut active: JournalistProfileActiveModel = profile.into();

        if let Some(bio) = fields.bio {
            active.bio = Set(Some(bio));
        }
        if let Some(experience) = fields.experience {
            active.experience = Set(Some(experience));
        }
        if let Some(specialization) = fields.specialization {
            active.specialization = Set(Some(specialization));
        }
        if let Some(location) = fields.location {
            active.location = Set(Some(location));
        }
        if let Some(languages) = fields.languages {
            active.languages = Set(Some(languages));
        }
        if let Some(website) = fields.website {
            active.website = Set(Some(website));
        }
        if let Some(social_media) = fields.social_media {
            active.social_media = Set(Some(social_media));
        }
        active.updated_at = Set(now());

        active.update(self.conn()).await.map_err(Into::into)
    }

    /// Staff moderation of a profile's verification state
    pub async fn set_profile_verification(
        &self,
        profile: JournalistProfile,
        status: VerificationStatus,
        tier: Option<MembershipTier>,
    ) -> Result<JournalistProfile> {
        let mut active: JournalistProfileActiveModel = profile.into();

        active.verification_status = Set(status.into());
        active.is_verified = Set(status == VerificationStatus::Verified);
        if let Some(tier) = tier {
            active.membership_tier = Set(tier.into());
        }
        active.updated_at = Set(now());

        active.update(self.conn()).await.map_err(Into::into)
    }

    pub async fn mentees_of(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<(JournalistProfile, Option<User>)>> {
        JournalistProfileEntity::find()
            .filter(JournalistProfileColumn::MentorId.eq(profile_id))
            .find_also_related(UserEntity)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_mentees(&self, profile_ids: &[Uuid]) -> Result<HashMap<Uuid, u64>> {
        self.count_grouped::<JournalistProfileEntity>(JournalistProfileColumn::MentorId, profile_ids)
            .await
    }

    /// Authors keyed by journalist profile id
    pub async fn authors_by_profile_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AuthorSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = JournalistProfileEntity::find()
            .filter(JournalistProfileColumn::Id.is_in(ids.iter().copied()))
            .find_also_related(UserEntity)
            .all(self.conn())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(profile, user)| {
                user.map(|user| {
                    (
                        profile.id,
                        AuthorSummary {
                            journalist_id: profile.id,
                            user_id: user.id,
                            name: user.name,
                            email: user.email,
                            is_verified: profile.is_verified,
                        },
                    )
                })
            })
            .collect())
    }

    pub async fn count_profiles(&self) -> Result<u64> {
        JournalistProfileEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_verified_profiles(&self) -> Result<u64> {
        JournalistProfileEntity::find()
            .filter(JournalistProfileColumn::IsVerified.eq(true))
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_profiles_with_status(&self, status: VerificationStatus) -> Result<u64> {
        JournalistProfileEntity::find()
            .filter(JournalistProfileColumn::VerificationStatus.eq(status))
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn profiles_by_verification_status(&self) -> Result<Vec<(String, u64)>> {
        self.count_by_text::<JournalistProfileEntity>(JournalistProfileColumn::VerificationStatus)
            .await
    }

    // ========================================================================
    // Case Operations
    // ========================================================================

    /// Whether a slug is taken by a case other than `exclude`
    pub async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool> {
        let mut query = CaseEntity::find().filter(CaseColumn::Slug.eq(slug));
        if let Some(id) = exclude {
            query = query.filter(CaseColumn::Id.ne(id));
        }

        Ok(query.count(self.conn()).await? > 0)
    }

    pub async fn create_case(&self, new: NewCase) -> Result<Case> {
        let now = now();

        CaseActiveModel {
            id: Set(Uuid::new_v4()),
            journalist_id: Set(new.journalist_id),
            title: Set(new.title),
            slug: Set(new.slug),
            description: Set(new.description),
            content: Set(new.content),
            category: Set(new.category),
            tags: Set(new.tags),
            location: Set(new.location),
            priority: Set(new.priority.into()),
            status: Set(CaseStatus::Draft.into()),
            is_public: Set(new.is_public),
            published_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    pub async fn find_case_by_id(&self, id: Uuid) -> Result<Option<Case>> {
        CaseEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_case_by_slug(&self, slug: &str) -> Result<Option<Case>> {
        CaseEntity::find()
            .filter(CaseColumn::Slug.eq(slug))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Cases the viewer may see, newest first
    pub async fn list_cases(
        &self,
        filter: &CaseFilter,
        viewer: &Viewer,
        page: Page,
    ) -> Result<(Vec<Case>, u64)> {
        let mut query = CaseEntity::find().filter(case_visibility(viewer));

        if let Some(search) = non_empty(&filter.search) {
            query = query.filter(
                Condition::any()
                    .add(contains_ci(CaseColumn::Title, search))
                    .add(contains_ci(CaseColumn::Description, search))
                    .add(contains_ci(CaseColumn::Content, search)),
            );
        }
        if let Some(category) = non_empty(&filter.category) {
            query = query.filter(CaseColumn::Category.eq(category));
        }
        if let Some(status) = filter.status {
            query = query.filter(CaseColumn::Status.eq(status));
        }
        if let Some(journalist_id) = filter.journalist_id {
            query = query.filter(CaseColumn::JournalistId.eq(journalist_id));
        }

        let paginator = query
            .order_by_desc(CaseColumn::CreatedAt)
            .paginate(self.conn(), page.limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;

        Ok((items, total))
    }

    pub async fn update_case(&self, case: Case, fields: CaseUpdateFields) -> Result<Case> {
        let mut active: CaseActiveModel = case.into();

        if let Some(title) = fields.title {
            active.title = Set(title);
        }
        if let Some(slug) = fields.slug {
            active.slug = Set(slug);
        }
        if let Some(description) = fields.description {
            active.description = Set(description);
        }
        if let Some(content) = fields.content {
            active.content = Set(Some(content));
        }
        if let Some(category) = fields.category {
            active.category = Set(category);
        }
        if let Some(tags) = fields.tags {
            active.tags = Set(Some(tags));
        }
        if let Some(location) = fields.location {
            active.location = Set(Some(location));
        }
        if let Some(priority) = fields.priority {
            active.priority = Set(priority.into());
        }
        if let Some(status) = fields.status {
            active.status = Set(status.into());
        }
        if let Some(is_public) = fields.is_public {
            active.is_public = Set(is_public);
        }
        if let Some(published_at) = fields.published_at {
            active.published_at = Set(Some(published_at));
        }
        active.updated_at = Set(now());

        active.update(self.conn()).await.map_err(Into::into)
    }

    /// Delete a case; children cascade in the schema
    pub async fn delete_case(&self, id: Uuid) -> Result<bool> {
        let result = CaseEntity::delete_by_id(id).exec(self.conn()).await?;
        Ok(result.rows_affected > 0)
    }

    /// Document, comment, update and timeline counts for each case
    pub async fn case_counts(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, CaseCounts>> {
        let (documents, comments, updates, timeline) = futures::try_join!(
            self.count_grouped::<DocumentEntity>(DocumentColumn::CaseId, ids),
            self.count_grouped::<CommentEntity>(CommentColumn::CaseId, ids),
            self.count_grouped::<CaseUpdateEntity>(CaseUpdateColumn::CaseId, ids),
            self.count_grouped::<TimelineEventEntity>(TimelineEventColumn::CaseId, ids),
        )?;

        Ok(ids
            .iter()
            .map(|id| {
                (
                    *id,
                    CaseCounts {
                        documents: documents.get(id).copied().unwrap_or(0),
                        comments: comments.get(id).copied().unwrap_or(0),
                        updates: updates.get(id).copied().unwrap_or(0),
                        timeline_events: timeline.get(id).copied().unwrap_or(0),
                    },
                )
            })
            .collect())
    }

    /// Case totals per journalist profile
    pub async fn count_cases_by_journalist(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, u64>> {
        self.count_grouped::<CaseEntity>(CaseColumn::JournalistId, ids)
            .await
    }

    pub async fn recent_public_cases_by(&self, journalist_id: Uuid, limit: u64) -> Result<Vec<Case>> {
        CaseEntity::find()
            .filter(CaseColumn::JournalistId.eq(journalist_id))
            .filter(CaseColumn::IsPublic.eq(true))
            .order_by_desc(CaseColumn::CreatedAt)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn recent_cases(&self, limit: u64) -> Result<Vec<Case>> {
        CaseEntity::find()
            .order_by_desc(CaseColumn::CreatedAt)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_cases(&self) -> Result<u64> {
        CaseEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_cases_with_status(&self, status: CaseStatus) -> Result<u64> {
        CaseEntity::find()
            .filter(CaseColumn::Status.eq(status))
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn cases_by_status(&self) -> Result<Vec<(String, u64)>> {
        self.count_by_text::<CaseEntity>(CaseColumn::Status).await
    }

    // ========================================================================
    // Case Children (timeline, sources, updates, comments)
    // ========================================================================

    pub async fn add_timeline_event(
        &self,
        case_id: Uuid,
        title: String,
        description: Option<String>,
        event_date: DateTimeWithTimeZone,
    ) -> Result<TimelineEvent> {
        TimelineEventActiveModel {
            id: Set(Uuid::new_v4()),
            case_id: Set(case_id),
            title: Set(title),
            description: Set(description),
            event_date: Set(event_date),
            created_at: Set(now()),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    pub async fn timeline_for_case(&self, case_id: Uuid) -> Result<Vec<TimelineEvent>> {
        TimelineEventEntity::find()
            .filter(TimelineEventColumn::CaseId.eq(case_id))
            .order_by_desc(TimelineEventColumn::EventDate)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn add_case_source(
        &self,
        case_id: Uuid,
        name: String,
        description: Option<String>,
        contact: Option<String>,
        is_confidential: bool,
    ) -> Result<CaseSource> {
        CaseSourceActiveModel {
            id: Set(Uuid::new_v4()),
            case_id: Set(case_id),
            name: Set(name),
            description: Set(description),
            contact: Set(contact),
            is_confidential: Set(is_confidential),
            created_at: Set(now()),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    pub async fn sources_for_case(&self, case_id: Uuid) -> Result<Vec<CaseSource>> {
        CaseSourceEntity::find()
            .filter(CaseSourceColumn::CaseId.eq(case_id))
            .order_by_desc(CaseSourceColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn add_case_update(
        &self,
        case_id: Uuid,
        author_id: Uuid,
        title: String,
        content: String,
    ) -> Result<CaseUpdate> {
        CaseUpdateActiveModel {
            id: Set(Uuid::new_v4()),
            case_id: Set(case_id),
            author_id: Set(author_id),
            title: Set(title),
            content: Set(content),
            created_at: Set(now()),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    pub async fn updates_for_case(&self, case_id: Uuid) -> Result<Vec<CaseUpdate>> {
        CaseUpdateEntity::find()
            .filter(CaseUpdateColumn::CaseId.eq(case_id))
            .order_by_desc(CaseUpdateColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn add_comment(&self, case_id: Uuid, user_id: Uuid, content: String) -> Result<Comment> {
        CommentActiveModel {
            id: Set(Uuid::new_v4()),
            case_id: Set(case_id),
            user_id: Set(user_id),
            content: Set(content),
            created_at: Set(now()),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    pub async fn comments_for_case(&self, case_id: Uuid) -> Result<Vec<Comment>> {
        CommentEntity::find()
            .filter(CommentColumn::CaseId.eq(case_id))
            .order_by_desc(CommentColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Case Subscription Operations
    // ========================================================================

    /// Subscribe a user to a case, re-activating an existing row
    pub async fn subscribe_to_case(&self, case_id: Uuid, user_id: Uuid) -> Result<CaseSubscription> {
        let existing = CaseSubscriptionEntity::find()
            .filter(CaseSubscriptionColumn::CaseId.eq(case_id))
            .filter(CaseSubscriptionColumn::UserId.eq(user_id))
            .one(self.conn())
            .await?;

        match existing {
            Some(sub) if sub.is_active => Ok(sub),
            Some(sub) => {
                let mut active: CaseSubscriptionActiveModel = sub.into();
                active.is_active = Set(true);
                active.update(self.conn()).await.map_err(Into::into)
            }
            None => CaseSubscriptionActiveModel {
                id: Set(Uuid::new_v4()),
                case_id: Set(case_id),
                user_id: Set(user_id),
                is_active: Set(true),
                created_at: Set(now()),
            }
            .insert(self.conn())
            .await
            .map_err(Into::into),
        }
    }

    /// Returns false when there was no active subscription
    pub async fn unsubscribe_from_case(&self, case_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = CaseSubscriptionEntity::update_many()
            .col_expr(CaseSubscriptionColumn::IsActive, Expr::value(false))
            .filter(CaseSubscriptionColumn::CaseId.eq(case_id))
            .filter(CaseSubscriptionColumn::UserId.eq(user_id))
            .filter(CaseSubscriptionColumn::IsActive.eq(true))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn active_case_subscribers(&self, case_id: Uuid) -> Result<Vec<CaseSubscription>> {
        CaseSubscriptionEntity::find()
            .filter(CaseSubscriptionColumn::CaseId.eq(case_id))
            .filter(CaseSubscriptionColumn::IsActive.eq(true))
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    pub async fn create_document(&self, new: NewDocument) -> Result<Document> {
        let now = now();

        DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            case_id: Set(new.case_id),
            title: Set(new.title),
            description: Set(new.description),
            file_name: Set(new.file_name),
            file_url: Set(new.file_url),
            file_type: Set(new.file_type),
            file_size: Set(new.file_size),
            document_type: Set(new.document_type.into()),
            is_public: Set(new.is_public),
            uploaded_by: Set(new.uploaded_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    pub async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Documents the viewer may see, newest first
    pub async fn list_documents(
        &self,
        filter: &DocumentFilter,
        viewer: &Viewer,
        page: Page,
    ) -> Result<(Vec<Document>, u64)> {
        let mut query = DocumentEntity::find();

        if let Some(case_id) = filter.case_id {
            query = query.filter(DocumentColumn::CaseId.eq(case_id));
        }

        if !viewer.is_staff() {
            let mut visible = Condition::any().add(DocumentColumn::IsPublic.eq(true));
            if let (Some(UserRole::Journalist), Some(journalist_id)) =
                (viewer.role, viewer.journalist_id)
            {
                query = query.inner_join(CaseEntity);
                visible = visible.add(CaseColumn::JournalistId.eq(journalist_id));
            }
            query = query.filter(visible);
        }

        let paginator = query
            .order_by_desc(DocumentColumn::CreatedAt)
            .paginate(self.conn(), page.limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;

        Ok((items, total))
    }

    /// Documents on one case; private ones only when `include_private`
    pub async fn documents_for_case(
        &self,
        case_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<Document>> {
        let mut query = DocumentEntity::find().filter(DocumentColumn::CaseId.eq(case_id));
        if !include_private {
            query = query.filter(DocumentColumn::IsPublic.eq(true));
        }

        query
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn update_document(
        &self,
        document: Document,
        fields: DocumentUpdateFields,
    ) -> Result<Document> {
        let mut active: DocumentActiveModel = document.into();

        if let Some(title) = fields.title {
            active.title = Set(title);
        }
        if let Some(description) = fields.description {
            active.description = Set(Some(description));
        }
        if let Some(document_type) = fields.document_type {
            active.document_type = Set(document_type.into());
        }
        if let Some(is_public) = fields.is_public {
            active.is_public = Set(is_public);
        }
        active.updated_at = Set(now());

        active.update(self.conn()).await.map_err(Into::into)
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let result = DocumentEntity::delete_by_id(id).exec(self.conn()).await?;
        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Notification Operations
    // ========================================================================

    pub async fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        NotificationActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(new.user_id),
            kind: Set(new.kind.into()),
            title: Set(new.title),
            message: Set(new.message),
            data: Set(new.data),
            priority: Set(new.priority.into()),
            is_read: Set(false),
            entity_id: Set(new.entity_id),
            entity_type: Set(new.entity_type),
            created_at: Set(now()),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    /// The user's notifications, newest first
    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Notification>, u64)> {
        let paginator = NotificationEntity::find()
            .filter(NotificationColumn::UserId.eq(user_id))
            .order_by_desc(NotificationColumn::CreatedAt)
            .paginate(self.conn(), page.limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;

        Ok((items, total))
    }

    pub async fn unread_notification_count(&self, user_id: Uuid) -> Result<u64> {
        NotificationEntity::find()
            .filter(NotificationColumn::UserId.eq(user_id))
            .filter(NotificationColumn::IsRead.eq(false))
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Mark one of the user's notifications read; false when none matched
    pub async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = NotificationEntity::update_many()
            .col_expr(NotificationColumn::IsRead, Expr::value(true))
            .filter(NotificationColumn::Id.eq(id))
            .filter(NotificationColumn::UserId.eq(user_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64> {
        let result = NotificationEntity::update_many()
            .col_expr(NotificationColumn::IsRead, Expr::value(true))
            .filter(NotificationColumn::UserId.eq(user_id))
            .filter(NotificationColumn::IsRead.eq(false))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = NotificationEntity::delete_many()
            .filter(NotificationColumn::Id.eq(id))
            .filter(NotificationColumn::UserId.eq(user_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Email Subscription Operations
    // ========================================================================

    pub async fn find_email_subscription(&self, user_id: Uuid) -> Result<Option<EmailSubscription>> {
        EmailSubscriptionEntity::find()
            .filter(EmailSubscriptionColumn::UserId.eq(user_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Email subscriptions keyed by user id
    pub async fn email_subscriptions_for(
        &self,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, EmailSubscription>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = EmailSubscriptionEntity::find()
            .filter(EmailSubscriptionColumn::UserId.is_in(user_ids.iter().copied()))
            .all(self.conn())
            .await?;

        Ok(rows.into_iter().map(|s| (s.user_id, s)).collect())
    }

    /// Insert or update the user's subscription and re-activate it
    pub async fn upsert_email_subscription(
        &self,
        user_id: Uuid,
        email: String,
        preferences: Option<serde_json::Value>,
        frequency: EmailFrequency,
    ) -> Result<EmailSubscription> {
        let now = now();

        match self.find_email_subscription(user_id).await? {
            Some(existing) => {
                let mut active: EmailSubscriptionActiveModel = existing.into();
                active.email = Set(email);
                if preferences.is_some() {
                    active.preferences = Set(preferences);
                }
                active.frequency = Set(frequency.into());
                active.is_active = Set(true);
                active.updated_at = Set(now);
                active.update(self.conn()).await.map_err(Into::into)
            }
            None => EmailSubscriptionActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                email: Set(email),
                preferences: Set(preferences),
                frequency: Set(frequency.into()),
                is_active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(self.conn())
            .await
            .map_err(Into::into),
        }
    }

    // ========================================================================
    // Email Queue Operations
    // ========================================================================

    pub async fn enqueue_email(&self, new: NewEmail) -> Result<EmailQueue> {
        let now = now();

        EmailQueueActiveModel {
            id: Set(Uuid::new_v4()),
            to_address: Set(new.to_address),
            subject: Set(new.subject),
            html_content: Set(new.html_content),
            text_content: Set(new.text_content),
            template_id: Set(new.template_id),
            data: Set(new.data),
            status: Set(EmailStatus::Pending.into()),
            attempts: Set(0),
            error: Set(None),
            sent_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    /// Oldest PENDING rows still under the attempt limit
    pub async fn pending_emails(&self, limit: u64, max_attempts: i32) -> Result<Vec<EmailQueue>> {
        EmailQueueEntity::find()
            .filter(EmailQueueColumn::Status.eq(EmailStatus::Pending))
            .filter(EmailQueueColumn::Attempts.lt(max_attempts))
            .order_by_asc(EmailQueueColumn::CreatedAt)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Move a row from PENDING to SENDING. False when another processor
    /// got there first.
    pub async fn claim_email(&self, id: Uuid) -> Result<bool> {
        let result = EmailQueueEntity::update_many()
            .col_expr(EmailQueueColumn::Status, Expr::value(EmailStatus::Sending))
            .col_expr(EmailQueueColumn::UpdatedAt, Expr::value(now()))
            .filter(EmailQueueColumn::Id.eq(id))
            .filter(EmailQueueColumn::Status.eq(EmailStatus::Pending))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn mark_email_sent(&self, id: Uuid) -> Result<()> {
        let now = now();

        EmailQueueEntity::update_many()
            .col_expr(EmailQueueColumn::Status, Expr::value(EmailStatus::Sent))
            .col_expr(EmailQueueColumn::SentAt, Expr::value(Some(now)))
            .col_expr(EmailQueueColumn::Error, Expr::value(Option::<String>::None))
            .col_expr(EmailQueueColumn::UpdatedAt, Expr::value(now))
            .filter(EmailQueueColumn::Id.eq(id))
            .exec(self.conn())
            .await?;

        Ok(())
    }

    /// Record a failed attempt and return the status the row moved to
    pub async fn record_email_failure(
        &self,
        email: &EmailQueue,
        error: &str,
        max_attempts: i32,
    ) -> Result<EmailStatus> {
        let attempts = email.attempts + 1;
        let status = EmailStatus::after_failure(attempts, max_attempts);

        EmailQueueEntity::update_many()
            .col_expr(EmailQueueColumn::Status, Expr::value(status))
            .col_expr(EmailQueueColumn::Attempts, Expr::value(attempts))
            .col_expr(EmailQueueColumn::Error, Expr::value(Some(error.to_string())))
            .col_expr(EmailQueueColumn::UpdatedAt, Expr::value(now()))
            .filter(EmailQueueColumn::Id.eq(email.id))
            .exec(self.conn())
            .await?;

        Ok(status)
    }

    /// Return rows stuck in SENDING since before `stale_before` to the
    /// queue, counting the interrupted delivery as a failed attempt
    pub async fn release_stale_emails(
        &self,
        stale_before: DateTimeWithTimeZone,
        max_attempts: i32,
    ) -> Result<u64> {
        let txn = self.conn().begin().await?;

        let failed = release_stale_update(stale_before, EmailStatus::Failed)
            .filter(EmailQueueColumn::Attempts.gte(max_attempts - 1))
            .exec(&txn)
            .await?;
        let retried = release_stale_update(stale_before, EmailStatus::Pending)
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(failed.rows_affected + retried.rows_affected)
    }

    pub async fn emails_by_status(&self) -> Result<Vec<(String, u64)>> {
        self.count_by_text::<EmailQueueEntity>(EmailQueueColumn::Status)
            .await
    }

    // ========================================================================
    // Verification Operations
    // ========================================================================

    pub async fn create_verification(&self, new: NewVerification) -> Result<Verification> {
        VerificationActiveModel {
            id: Set(Uuid::new_v4()),
            target_id: Set(new.target_id),
            target_type: Set(new.target_type.into()),
            status: Set(new.status.into()),
            confidence: Set(new.confidence),
            notes: Set(new.notes),
            evidence: Set(new.evidence),
            verifier_id: Set(new.verifier_id),
            verifier_type: Set(new.verifier_type.into()),
            created_at: Set(now()),
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    /// Verifications with their verifier accounts, newest first
    pub async fn list_verifications(
        &self,
        filter: &VerificationFilter,
        page: Page,
    ) -> Result<(Vec<(Verification, Option<User>)>, u64)> {
        let mut query = VerificationEntity::find().find_also_related(UserEntity);

        if let Some(target_id) = filter.target_id {
            query = query.filter(VerificationColumn::TargetId.eq(target_id));
        }
        if let Some(target_type) = filter.target_type {
            query = query.filter(VerificationColumn::TargetType.eq(target_type));
        }
        if let Some(verifier_id) = filter.verifier_id {
            query = query.filter(VerificationColumn::VerifierId.eq(verifier_id));
        }

        let paginator = query
            .order_by_desc(VerificationColumn::CreatedAt)
            .paginate(self.conn(), page.limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;

        Ok((items, total))
    }
}
