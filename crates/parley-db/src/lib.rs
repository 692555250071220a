//! Parley Database Layer
//!
//! SQLite persistence for negotiation instances, transcripts, and usage
//! counters. SQLite is the deployment target: the whole service runs as a
//! single process next to its data file (WAL mode), and in-memory pools back
//! the test suites.
//!
//! # Repository Pattern
//!
//! Each domain has its own repository. Instance lifecycle transitions are
//! guarded conditional writes — see [`repos::InstanceRepo`].

pub mod config;
pub mod error;
pub mod models;
pub mod repos;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use models::*;
pub use repos::*;

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    /// SQLite connection pool
    pub pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the configured SQLite database
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Opening SQLite database: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!("SQLite database ready");

        Ok(Self { pool })
    }

    /// Open a private in-memory database (single connection so every caller
    /// sees the same data). Used by tests and throwaway tooling.
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Create repository instances
    pub fn instance_repo(&self) -> InstanceRepo {
        InstanceRepo::new(self.pool.clone())
    }

    pub fn transcript_repo(&self) -> TranscriptRepo {
        TranscriptRepo::new(self.pool.clone())
    }

    pub fn usage_repo(&self) -> UsageRepo {
        UsageRepo::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_migrates_and_answers_health() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.health_check().await);
    }
}
