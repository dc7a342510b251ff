//! In-app notifications and the emails that accompany them
//!
//! Every notification write goes through `Notifier`, which also logs a
//! structured `notification_created` event for real-time consumers.

use crate::db::models::{
    Case, EmailQueue, EmailSubscription, Notification, NotificationPriority, NotificationType,
};
use crate::db::{NewEmail, NewNotification, Repository};
use crate::errors::Result;
use crate::mail::render_notification_email;
use crate::metrics::record_notification;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const CASE_ENTITY: &str = "case";
pub const JOURNALIST_ENTITY: &str = "journalist";

/// Content shared by every recipient of one event
#[derive(Debug, Clone)]
pub struct Announcement {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub data: Option<Value>,
}

impl Announcement {
    pub fn new(kind: NotificationType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            priority: NotificationPriority::default(),
            data: None,
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Notification row for one recipient
    pub fn to_user(&self, user_id: Uuid, entity: Option<(Uuid, &str)>) -> NewNotification {
        NewNotification {
            user_id,
            kind: self.kind,
            title: self.title.clone(),
            message: self.message.clone(),
            data: self.data.clone(),
            priority: self.priority,
            entity_id: entity.map(|(id, _)| id),
            entity_type: entity.map(|(_, kind)| kind.to_string()),
        }
    }
}

/// Persistence the notifier writes through
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification>;

    async fn enqueue_email(&self, new: NewEmail) -> Result<EmailQueue>;

    /// Users with an active subscription to the case
    async fn case_subscriber_ids(&self, case_id: Uuid) -> Result<Vec<Uuid>>;

    /// Email subscriptions keyed by user, for users that have one
    async fn email_subscriptions_for(
        &self,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, EmailSubscription>>;

    /// Active moderators and admins
    async fn active_staff_ids(&self) -> Result<Vec<Uuid>>;
}

#[async_trait]
impl NotificationStore for Repository {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        Repository::create_notification(self, new).await
    }

    async fn enqueue_email(&self, new: NewEmail) -> Result<EmailQueue> {
        Repository::enqueue_email(self, new).await
    }

    async fn case_subscriber_ids(&self, case_id: Uuid) -> Result<Vec<Uuid>> {
        let subscribers = self.active_case_subscribers(case_id).await?;
        Ok(subscribers.into_iter().map(|s| s.user_id).collect())
    }

    async fn email_subscriptions_for(
        &self,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, EmailSubscription>> {
        Repository::email_subscriptions_for(self, user_ids).await
    }

    async fn active_staff_ids(&self) -> Result<Vec<Uuid>> {
        Repository::active_staff_ids(self).await
    }
}

/// Recipients reached by a fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOut {
    pub notified: usize,
    pub emailed: usize,
}

/// Merge case identifiers into the announcement payload
fn case_payload(case: &Case, data: Option<&Value>) -> Value {
    let mut payload = json!({
        "case_id": case.id,
        "case_slug": case.slug,
        "case_title": case.title,
    });

    if let (Some(Value::Object(extra)), Value::Object(map)) = (data, &mut payload) {
        for (key, value) in extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    payload
}

/// Notification service
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn NotificationStore>,
    public_base_url: String,
}

impl Notifier {
    pub fn new(store: impl NotificationStore + 'static, public_base_url: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Public link to a case
    pub fn case_url(&self, slug: &str) -> String {
        format!("{}/cases/{}", self.public_base_url, slug)
    }

    /// Persist one notification
    pub async fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        let notification = self.store.create_notification(new).await?;

        record_notification(notification.notification_type());
        info!(
            event = "notification_created",
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = %notification.kind,
            "Notification created"
        );

        Ok(notification)
    }

    /// Notify a single user
    pub async fn notify_user(
        &self,
        user_id: Uuid,
        announcement: &Announcement,
        entity: Option<(Uuid, &str)>,
    ) -> Result<Notification> {
        self.create_notification(announcement.to_user(user_id, entity))
            .await
    }

    /// Queue an email for the mail worker
    pub async fn queue_email(&self, email: NewEmail) -> Result<EmailQueue> {
        let queued = self.store.enqueue_email(email).await?;
        debug!(email_id = %queued.id, to = %queued.to_address, "Email queued");
        Ok(queued)
    }

    /// In-app notification to every active subscriber of a case, plus an
    /// email for those whose email subscription asks for it.
    pub async fn notify_case_subscribers(
        &self,
        case: &Case,
        announcement: &Announcement,
    ) -> Result<FanOut> {
        let user_ids = self.store.case_subscriber_ids(case.id).await?;
        if user_ids.is_empty() {
            return Ok(FanOut::default());
        }

        let email_subscriptions = self.store.email_subscriptions_for(&user_ids).await?;

        let announcement = announcement
            .clone()
            .with_data(case_payload(case, announcement.data.as_ref()));
        let case_url = self.case_url(&case.slug);
        let rendered =
            render_notification_email(&announcement.title, &announcement.message, Some(&case_url));

        let mut fan_out = FanOut::default();

        for user_id in user_ids {
            self.notify_user(user_id, &announcement, Some((case.id, CASE_ENTITY)))
                .await?;
            fan_out.notified += 1;

            let subscription = email_subscriptions.get(&user_id);
            if let Some(subscription) = subscription.filter(|s| s.wants_email()) {
                self.queue_email(NewEmail {
                    to_address: subscription.email.clone(),
                    subject: rendered.subject.clone(),
                    html_content: rendered.html.clone(),
                    text_content: Some(rendered.text.clone()),
                    template_id: Some(announcement.kind.as_str().to_lowercase()),
                    data: announcement.data.clone(),
                })
                .await?;
                fan_out.emailed += 1;
            }
        }

        info!(
            case_id = %case.id,
            kind = %announcement.kind,
            notified = fan_out.notified,
            emailed = fan_out.emailed,
            "Case subscribers notified"
        );

        Ok(fan_out)
    }

    /// In-app notification to every active moderator and admin
    pub async fn notify_staff(
        &self,
        announcement: &Announcement,
        entity: Option<(Uuid, &str)>,
    ) -> Result<usize> {
        let staff = self.store.active_staff_ids().await?;

        for user_id in &staff {
            self.notify_user(*user_id, announcement, entity).await?;
        }

        info!(kind = %announcement.kind, recipients = staff.len(), "Staff notified");
        Ok(staff.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CaseStatus, EmailFrequency, EmailStatus, Priority};
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records writes; reads come from the seeded maps
    #[derive(Default)]
    struct MemoryStore {
        subscribers: HashMap<Uuid, Vec<Uuid>>,
        email_subscriptions: HashMap<Uuid, EmailSubscription>,
        staff: Vec<Uuid>,
        notifications: Mutex<Vec<NewNotification>>,
        emails: Mutex<Vec<NewEmail>>,
    }

    #[async_trait]
    impl NotificationStore for Arc<MemoryStore> {
        async fn create_notification(&self, new: NewNotification) -> Result<Notification> {
            let row = Notification {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                kind: new.kind.to_string(),
                title: new.title.clone(),
                message: new.message.clone(),
                data: new.data.clone(),
                priority: new.priority.to_string(),
                is_read: false,
                entity_id: new.entity_id,
                entity_type: new.entity_type.clone(),
                created_at: Utc::now().into(),
            };
            self.notifications.lock().unwrap().push(new);
            Ok(row)
        }

        async fn enqueue_email(&self, new: NewEmail) -> Result<EmailQueue> {
            let now = Utc::now().into();
            let row = EmailQueue {
                id: Uuid::new_v4(),
                to_address: new.to_address.clone(),
                subject: new.subject.clone(),
                html_content: new.html_content.clone(),
                text_content: new.text_content.clone(),
                template_id: new.template_id.clone(),
                data: new.data.clone(),
                status: EmailStatus::Pending.to_string(),
                attempts: 0,
                error: None,
                sent_at: None,
                created_at: now,
                updated_at: now,
            };
            self.emails.lock().unwrap().push(new);
            Ok(row)
        }

        async fn case_subscriber_ids(&self, case_id: Uuid) -> Result<Vec<Uuid>> {
            Ok(self.subscribers.get(&case_id).cloned().unwrap_or_default())
        }

        async fn email_subscriptions_for(
            &self,
            user_ids: &[Uuid],
        ) -> Result<HashMap<Uuid, EmailSubscription>> {
            Ok(self
                .email_subscriptions
                .iter()
                .filter(|(id, _)| user_ids.contains(id))
                .map(|(id, s)| (*id, s.clone()))
                .collect())
        }

        async fn active_staff_ids(&self) -> Result<Vec<Uuid>> {
            Ok(self.staff.clone())
        }
    }

    fn case() -> Case {
        let now = Utc::now().into();
        Case {
            id: Uuid::new_v4(),
            journalist_id: None,
            title: "Water tender".to_string(),
            slug: "water-tender".to_string(),
            description: "d".to_string(),
            content: None,
            category: "governance".to_string(),
            tags: None,
            location: None,
            priority: Priority::Medium.to_string(),
            status: CaseStatus::Published.to_string(),
            is_public: true,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn subscription(active: bool, frequency: EmailFrequency) -> EmailSubscription {
        subscription_for(Uuid::new_v4(), active, frequency)
    }

    fn subscription_for(user_id: Uuid, active: bool, frequency: EmailFrequency) -> EmailSubscription {
        let now = Utc::now().into();
        EmailSubscription {
            id: Uuid::new_v4(),
            user_id,
            email: "reader@example.org".to_string(),
            preferences: None,
            frequency: frequency.to_string(),
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_announcement_defaults_to_medium_priority() {
        let a = Announcement::new(NotificationType::CaseUpdated, "t", "m");
        assert_eq!(a.priority, NotificationPriority::Medium);
        assert!(a.data.is_none());
    }

    #[test]
    fn test_to_user_carries_entity() {
        let case_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let row = Announcement::new(NotificationType::CaseComment, "t", "m")
            .with_priority(NotificationPriority::High)
            .to_user(user_id, Some((case_id, CASE_ENTITY)));

        assert_eq!(row.user_id, user_id);
        assert_eq!(row.entity_id, Some(case_id));
        assert_eq!(row.entity_type.as_deref(), Some("case"));
        assert_eq!(row.priority, NotificationPriority::High);
    }

    #[test]
    fn test_email_subscription_gates_email() {
        assert!(subscription(true, EmailFrequency::Immediate).wants_email());
        assert!(subscription(true, EmailFrequency::Weekly).wants_email());
        assert!(!subscription(true, EmailFrequency::Never).wants_email());
        assert!(!subscription(false, EmailFrequency::Daily).wants_email());
    }

    #[test]
    fn test_case_payload_keeps_case_ids_over_extra_keys() {
        let c = case();
        let payload = case_payload(&c, Some(&json!({ "case_id": "spoofed", "update_id": 7 })));

        assert_eq!(payload["case_id"], json!(c.id));
        assert_eq!(payload["case_slug"], "water-tender");
        assert_eq!(payload["update_id"], 7);
    }

    #[test]
    fn test_case_payload_ignores_non_object_data() {
        let c = case();
        let payload = case_payload(&c, Some(&json!("scalar")));
        assert_eq!(payload.as_object().map(|m| m.len()), Some(3));
    }

    #[tokio::test]
    async fn test_case_fan_out_notifies_all_and_emails_opted_in() {
        let c = case();
        let (daily, never, inactive, none) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut seeded = MemoryStore::default();
        seeded.subscribers.insert(c.id, vec![daily, never, inactive, none]);
        for (user_id, active, frequency) in [
            (daily, true, EmailFrequency::Daily),
            (never, true, EmailFrequency::Never),
            (inactive, false, EmailFrequency::Immediate),
        ] {
            seeded
                .email_subscriptions
                .insert(user_id, subscription_for(user_id, active, frequency));
        }
        let store = Arc::new(seeded);
        let notifier = Notifier::new(store.clone(), "https://casefile.example/");

        let announcement = Announcement::new(NotificationType::CaseUpdated, "New evidence", "Filed today")
            .with_data(json!({ "update_id": 3 }));
        let fan_out = notifier.notify_case_subscribers(&c, &announcement).await.unwrap();

        assert_eq!(fan_out, FanOut { notified: 4, emailed: 1 });

        let notifications = store.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 4);
        assert!(notifications.iter().all(|n| n.entity_id == Some(c.id)));
        assert!(notifications.iter().all(|n| n.entity_type.as_deref() == Some(CASE_ENTITY)));
        let data = notifications[0].data.as_ref().unwrap();
        assert_eq!(data["case_slug"], "water-tender");
        assert_eq!(data["update_id"], 3);

        let emails = store.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].to_address, "reader@example.org");
        assert_eq!(emails[0].subject, "Casefile: New evidence");
        assert_eq!(emails[0].template_id.as_deref(), Some("case_updated"));
        assert!(emails[0]
            .html_content
            .contains("https://casefile.example/cases/water-tender"));
    }

    #[tokio::test]
    async fn test_case_without_subscribers_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let notifier = Notifier::new(store.clone(), "https://casefile.example");

        let announcement = Announcement::new(NotificationType::CasePublished, "t", "m");
        let fan_out = notifier.notify_case_subscribers(&case(), &announcement).await.unwrap();

        assert_eq!(fan_out, FanOut::default());
        assert!(store.notifications.lock().unwrap().is_empty());
        assert!(store.emails.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staff_fan_out_is_in_app_only() {
        let journalist_id = Uuid::new_v4();
        let store = Arc::new(MemoryStore {
            staff: vec![Uuid::new_v4(), Uuid::new_v4()],
            ..MemoryStore::default()
        });
        let notifier = Notifier::new(store.clone(), "https://casefile.example");

        let announcement = Announcement::new(NotificationType::VerificationRequested, "Review", "Pending");
        let recipients = notifier
            .notify_staff(&announcement, Some((journalist_id, JOURNALIST_ENTITY)))
            .await
            .unwrap();

        assert_eq!(recipients, 2);
        let notifications = store.notifications.lock().unwrap();
        let notified: Vec<Uuid> = notifications.iter().map(|n| n.user_id).collect();
        assert_eq!(notified, store.staff);
        assert!(notifications
            .iter()
            .all(|n| n.entity_type.as_deref() == Some(JOURNALIST_ENTITY)));
        assert!(store.emails.lock().unwrap().is_empty());
    }
}
