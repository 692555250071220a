//! Daily usage repository
//!
//! Per-address counters of negotiations started per UTC day, used by the
//! service layer to bound runs per buyer. Rows older than the retention
//! window are pruned opportunistically.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::error::DbResult;

pub struct UsageRepo {
    pool: SqlitePool,
}

impl UsageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Negotiations started by this address today
    pub async fn count_today(&self, address: &str) -> DbResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT negotiations_started FROM daily_usage WHERE address = ? AND date = ?",
        )
        .bind(address)
        .bind(Self::today())
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    /// Record one started negotiation and return the new count for today
    pub async fn increment(&self, address: &str) -> DbResult<i64> {
        sqlx::query(
            r#"
            INSERT INTO daily_usage (address, date, negotiations_started)
            VALUES (?, ?, 1)
            ON CONFLICT(address, date)
            DO UPDATE SET negotiations_started = negotiations_started + 1
            "#,
        )
        .bind(address)
        .bind(Self::today())
        .execute(&self.pool)
        .await?;

        self.count_today(address).await
    }

    /// Delete counters older than `days_to_keep` days
    pub async fn cleanup(&self, days_to_keep: i64) -> DbResult<u64> {
        let cutoff = (Utc::now() - Duration::days(days_to_keep))
            .format("%Y-%m-%d")
            .to_string();

        let result = sqlx::query("DELETE FROM daily_usage WHERE date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_counts_start_at_zero_and_increment() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.usage_repo();

        assert_eq!(repo.count_today("0xbuyer").await.unwrap(), 0);
        assert_eq!(repo.increment("0xbuyer").await.unwrap(), 1);
        assert_eq!(repo.increment("0xbuyer").await.unwrap(), 2);
        assert_eq!(repo.count_today("0xother").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_prunes_old_rows() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.usage_repo();

        sqlx::query(
            "INSERT INTO daily_usage (address, date, negotiations_started) VALUES (?, ?, ?)",
        )
        .bind("0xbuyer")
        .bind("2000-01-01")
        .bind(4i64)
        .execute(&db.pool)
        .await
        .unwrap();
        repo.increment("0xbuyer").await.unwrap();

        assert_eq!(repo.cleanup(7).await.unwrap(), 1);
        assert_eq!(repo.count_today("0xbuyer").await.unwrap(), 1);
    }
}
