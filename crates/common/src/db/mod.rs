//! Database layer for Casefile
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection pool management and migrations

pub mod models;
mod repository;

pub use repository::{
    AuthorSummary, CaseCounts, CaseFilter, CaseUpdateFields, DocumentFilter,
    DocumentUpdateFields, JournalistFilter, NewCase, NewDocument, NewEmail, NewNotification,
    NewVerification, Page, Pagination, ProfileUpdateFields, Repository, VerificationFilter,
};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Migrations embedded at build time from the workspace `migrations/` dir
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(true);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.conn.get_postgres_connection_pool();
        MIGRATOR.run(pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}
