//! Casefile Common Library
//!
//! Shared code for the Casefile gateway and mail worker including:
//! - Database models and repository patterns
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Notifications, mail delivery and the email queue
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod mail;
pub mod metrics;
pub mod notifications;
pub mod queue;
pub mod slug;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};
pub use mail::Mailer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
