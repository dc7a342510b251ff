//! API handlers module

pub mod admin;
pub mod auth;
pub mod cases;
pub mod documents;
pub mod health;
pub mod journalists;
pub mod notifications;
pub mod verifications;

use casefile_common::db::models::{User, UserRole};
use casefile_common::errors::{AppError, Result};
use serde::Serialize;
use uuid::Uuid;

/// Public view of an account
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub role: UserRole,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.user_role(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fan-out failures are logged and never fail the request that caused them
pub(crate) fn log_fan_out_failure<T>(result: Result<T>, event: &'static str) {
    if let Err(e) = result {
        tracing::warn!(error = %e, event, "Notification fan-out failed");
    }
}

/// Trim and drop empty strings from optional input
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Trimmed value of a required text field; blank counts as missing
pub(crate) fn required(value: String, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_user_summary_parses_role() {
        let now = Utc::now().into();
        let user = User {
            id: Uuid::new_v4(),
            email: "ed@example.org".to_string(),
            password_hash: "secret".to_string(),
            name: None,
            role: "MODERATOR".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let summary = UserSummary::from(&user);
        assert_eq!(summary.role, UserRole::Moderator);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["role"], "MODERATOR");
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_clean_drops_blank() {
        assert_eq!(clean(Some("  ".to_string())), None);
        assert_eq!(clean(Some(" Delhi ".to_string())), Some("Delhi".to_string()));
        assert_eq!(clean(None), None);
    }

    #[test]
    fn test_required_rejects_whitespace() {
        assert!(matches!(
            required("   ".to_string(), "title"),
            Err(AppError::MissingField { ref field }) if field == "title"
        ));
        assert_eq!(required(" Flood ".to_string(), "title").unwrap(), "Flood");
    }
}
