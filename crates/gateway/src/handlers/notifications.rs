//! Notification and email subscription handlers
//!
//! Every route here is scoped to the caller's own rows. Creating a
//! notification for someone else is a staff action.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{clean, required, MessageResponse};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use casefile_common::{
    auth::AuthUser,
    db::models::{EmailFrequency, EmailSubscription, Notification, NotificationPriority, NotificationType},
    db::{NewNotification, Page, Pagination},
    errors::{AppError, Result},
};

const DEFAULT_LIMIT: u64 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Return only the unread count
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum NotificationsResponse {
    Page {
        notifications: Vec<Notification>,
        pagination: Pagination,
    },
    UnreadCount {
        unread_count: u64,
    },
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,

    #[serde(rename = "type")]
    pub kind: NotificationType,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(min = 1, max = 2000))]
    pub message: String,

    #[serde(default)]
    pub priority: NotificationPriority,

    pub data: Option<serde_json::Value>,

    pub entity_id: Option<Uuid>,

    #[validate(length(max = 50))]
    pub entity_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(email)]
    pub email: String,
    pub preferences: Option<serde_json::Value>,
    pub frequency: Option<EmailFrequency>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub subscribed: bool,
    pub email: String,
    pub subscription: Option<EmailSubscription>,
}

impl SubscriptionStatusResponse {
    fn new(account_email: &str, subscription: Option<EmailSubscription>) -> Self {
        match subscription {
            Some(s) => Self {
                subscribed: s.is_active,
                email: s.email.clone(),
                subscription: Some(s),
            },
            None => Self {
                subscribed: false,
                email: account_email.to_string(),
                subscription: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MarkAllResponse {
    pub updated: u64,
}

/// The caller's notifications, or just the unread count
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ListNotificationsQuery>,
) -> Result<Json<NotificationsResponse>> {
    let repo = state.repo();

    if query.unread_only {
        let unread_count = repo.unread_notification_count(user.user_id).await?;
        return Ok(Json(NotificationsResponse::UnreadCount { unread_count }));
    }

    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT);
    let (notifications, total) = repo.list_notifications(user.user_id, page).await?;

    Ok(Json(NotificationsResponse::Page {
        notifications,
        pagination: page.pagination(total),
    }))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    if !state.repo().mark_notification_read(id, user.user_id).await? {
        return Err(AppError::not_found("notification", id));
    }
    Ok(Json(MessageResponse::new("Notification marked as read")))
}

pub async fn mark_all_as_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MarkAllResponse>> {
    let updated = state.repo().mark_all_notifications_read(user.user_id).await?;
    info!(user_id = %user.user_id, updated, "Notifications marked read");
    Ok(Json(MarkAllResponse { updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    if !state.repo().delete_notification(id, user.user_id).await? {
        return Err(AppError::not_found("notification", id));
    }
    Ok(Json(MessageResponse::new("Notification deleted")))
}

/// Send a notification to any user; staff only
pub async fn create_notification(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>)> {
    user.require_staff("send notifications")?;

    if state.repo().find_user_by_id(req.user_id).await?.is_none() {
        return Err(AppError::not_found("user", req.user_id));
    }

    let notification = state
        .notifier
        .create_notification(NewNotification {
            user_id: req.user_id,
            kind: req.kind,
            title: required(req.title, "title")?,
            message: required(req.message, "message")?,
            data: req.data,
            priority: req.priority,
            entity_id: req.entity_id,
            entity_type: clean(req.entity_type),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(notification)))
}

/// Create or refresh the caller's email subscription
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<SubscribeRequest>,
) -> Result<Json<EmailSubscription>> {
    let frequency = req.frequency.unwrap_or_default();

    let subscription = state
        .repo()
        .upsert_email_subscription(
            user.user_id,
            req.email.trim().to_lowercase(),
            req.preferences,
            frequency,
        )
        .await?;

    info!(user_id = %user.user_id, frequency = %frequency, "Email subscription saved");
    Ok(Json(subscription))
}

pub async fn subscription_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SubscriptionStatusResponse>> {
    let subscription = state.repo().find_email_subscription(user.user_id).await?;
    Ok(Json(SubscriptionStatusResponse::new(&user.email, subscription)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_unread_only_defaults_false() {
        let query: ListNotificationsQuery = serde_json::from_value(json!({})).unwrap();
        assert!(!query.unread_only);
    }

    #[test]
    fn test_unread_count_shape() {
        let body = serde_json::to_value(NotificationsResponse::UnreadCount { unread_count: 4 }).unwrap();
        assert_eq!(body, json!({ "unread_count": 4 }));
    }

    #[test]
    fn test_create_request_reads_type_field() {
        let req: CreateNotificationRequest = serde_json::from_value(json!({
            "user_id": Uuid::new_v4(),
            "type": "SYSTEM_ANNOUNCEMENT",
            "title": "Maintenance",
            "message": "Tonight at 22:00",
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.kind, NotificationType::SystemAnnouncement);
        assert_eq!(req.priority, NotificationPriority::Medium);
    }

    #[test]
    fn test_subscribe_requires_valid_email() {
        let req: SubscribeRequest =
            serde_json::from_value(json!({ "email": "nope" })).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_without_subscription_uses_account_email() {
        let status = SubscriptionStatusResponse::new("me@example.org", None);
        assert!(!status.subscribed);
        assert_eq!(status.email, "me@example.org");
    }

    #[test]
    fn test_status_with_inactive_subscription() {
        let now = Utc::now().into();
        let stored = EmailSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            email: "alerts@example.org".to_string(),
            preferences: None,
            frequency: EmailFrequency::Weekly.to_string(),
            is_active: false,
            created_at: now,
            updated_at: now,
        };

        let status = SubscriptionStatusResponse::new("me@example.org", Some(stored));
        assert!(!status.subscribed);
        assert_eq!(status.email, "alerts@example.org");
        assert!(status.subscription.is_some());
    }
}
