//! Enumerated column values
//!
//! Every enum is stored as TEXT holding its SCREAMING_SNAKE_CASE name.
//! Unknown strings coming back from the database fall back to the
//! variant marked as default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned when a string does not name any variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                s.parse().unwrap_or_default()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl From<$name> for sea_orm::Value {
            fn from(value: $name) -> Self {
                sea_orm::Value::String(Some(Box::new(value.as_str().to_string())))
            }
        }
    };
}

text_enum! {
    /// Account role
    UserRole, default = Public {
        Public => "PUBLIC",
        Journalist => "JOURNALIST",
        Moderator => "MODERATOR",
        Admin => "ADMIN",
    }
}

impl UserRole {
    /// Moderators and admins
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }

    /// Roles that may be chosen at registration
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, UserRole::Public | UserRole::Journalist)
    }
}

text_enum! {
    MembershipTier, default = Associate {
        Associate => "ASSOCIATE",
        Verified => "VERIFIED",
        Senior => "SENIOR",
        Mentor => "MENTOR",
    }
}

text_enum! {
    VerificationStatus, default = Pending {
        Pending => "PENDING",
        Verified => "VERIFIED",
        Rejected => "REJECTED",
        Suspended => "SUSPENDED",
    }
}

text_enum! {
    CaseStatus, default = Draft {
        Draft => "DRAFT",
        InProgress => "IN_PROGRESS",
        UnderReview => "UNDER_REVIEW",
        Published => "PUBLISHED",
        Archived => "ARCHIVED",
        Closed => "CLOSED",
    }
}

text_enum! {
    Priority, default = Medium {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Urgent => "URGENT",
    }
}

text_enum! {
    DocumentType, default = Evidence {
        Evidence => "EVIDENCE",
        Rti => "RTI",
        Fir => "FIR",
        Notice => "NOTICE",
        Video => "VIDEO",
        Audio => "AUDIO",
        Image => "IMAGE",
        LegalDocument => "LEGAL_DOCUMENT",
        Correspondence => "CORRESPONDENCE",
    }
}

text_enum! {
    NotificationType, default = SystemAnnouncement {
        CasePublished => "CASE_PUBLISHED",
        CaseUpdated => "CASE_UPDATED",
        CaseComment => "CASE_COMMENT",
        DocumentUploaded => "DOCUMENT_UPLOADED",
        VerificationRequested => "VERIFICATION_REQUESTED",
        VerificationCompleted => "VERIFICATION_COMPLETED",
        SubscriptionAlert => "SUBSCRIPTION_ALERT",
        SystemAnnouncement => "SYSTEM_ANNOUNCEMENT",
        JournalistVerified => "JOURNALIST_VERIFIED",
        Mention => "MENTION",
        DeadlineReminder => "DEADLINE_REMINDER",
    }
}

text_enum! {
    NotificationPriority, default = Medium {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Urgent => "URGENT",
    }
}

text_enum! {
    /// Delivery state of a queued email
    EmailStatus, default = Pending {
        Pending => "PENDING",
        Sending => "SENDING",
        Sent => "SENT",
        Failed => "FAILED",
    }
}

impl EmailStatus {
    /// Status after a failed delivery attempt that brought the
    /// attempt counter to `attempts`.
    pub fn after_failure(attempts: i32, max_attempts: i32) -> Self {
        if attempts >= max_attempts {
            EmailStatus::Failed
        } else {
            EmailStatus::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EmailStatus::Sent | EmailStatus::Failed)
    }
}

text_enum! {
    EmailFrequency, default = Daily {
        Immediate => "IMMEDIATE",
        Daily => "DAILY",
        Weekly => "WEEKLY",
        Never => "NEVER",
    }
}

text_enum! {
    VerificationTarget, default = Case {
        Case => "CASE",
        Document => "DOCUMENT",
        Source => "SOURCE",
        Journalist => "JOURNALIST",
    }
}

text_enum! {
    VerifierType, default = Public {
        Public => "PUBLIC",
        Journalist => "JOURNALIST",
        Admin => "ADMIN",
    }
}

impl From<UserRole> for VerifierType {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Journalist => VerifierType::Journalist,
            UserRole::Moderator | UserRole::Admin => VerifierType::Admin,
            UserRole::Public => VerifierType::Public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip_for_every_case_status() {
        for status in CaseStatus::ALL {
            assert_eq!(status.as_str().parse::<CaseStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn test_unknown_text_falls_back_to_default() {
        assert_eq!(CaseStatus::from("SHREDDED"), CaseStatus::Draft);
        assert_eq!(Priority::from(""), Priority::Medium);
        assert!("SHREDDED".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&DocumentType::LegalDocument).unwrap();
        assert_eq!(json, "\"LEGAL_DOCUMENT\"");
        let parsed: CaseStatus = serde_json::from_str("\"UNDER_REVIEW\"").unwrap();
        assert_eq!(parsed, CaseStatus::UnderReview);
    }

    #[test]
    fn test_staff_roles() {
        assert!(UserRole::Admin.is_staff());
        assert!(UserRole::Moderator.is_staff());
        assert!(!UserRole::Journalist.is_staff());
        assert!(!UserRole::Public.is_staff());
    }

    #[test]
    fn test_self_assignable_roles() {
        assert!(UserRole::Public.is_self_assignable());
        assert!(UserRole::Journalist.is_self_assignable());
        assert!(!UserRole::Admin.is_self_assignable());
        assert!(!UserRole::Moderator.is_self_assignable());
    }

    #[test]
    fn test_email_status_after_failure() {
        assert_eq!(EmailStatus::after_failure(1, 3), EmailStatus::Pending);
        assert_eq!(EmailStatus::after_failure(2, 3), EmailStatus::Pending);
        assert_eq!(EmailStatus::after_failure(3, 3), EmailStatus::Failed);
        assert!(EmailStatus::Failed.is_terminal());
        assert!(!EmailStatus::Sending.is_terminal());
    }

    #[test]
    fn test_verifier_type_from_role() {
        assert_eq!(VerifierType::from(UserRole::Journalist), VerifierType::Journalist);
        assert_eq!(VerifierType::from(UserRole::Moderator), VerifierType::Admin);
        assert_eq!(VerifierType::from(UserRole::Public), VerifierType::Public);
    }
}
