//! Transcript repository
//!
//! Append-only turn log per instance. Turn numbers are assigned by the
//! caller, dense from 1, shared across both roles; the UNIQUE(instance_id,
//! turn) constraint rejects any duplicate numbering at the store level.
//! Turns are internal diagnostic state and are never served through an
//! external read interface.

use chrono::Utc;
use sqlx::SqlitePool;

use parley_types::{Turn, TurnRole};

use crate::error::DbResult;
use crate::models::TurnRow;

pub struct TranscriptRepo {
    pool: SqlitePool,
}

impl TranscriptRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one turn to an instance's transcript
    pub async fn append(
        &self,
        instance_id: &str,
        turn: u32,
        role: TurnRole,
        content: &str,
    ) -> DbResult<Turn> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO turns (instance_id, turn, role, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(instance_id)
        .bind(i64::from(turn))
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Turn {
            id: result.last_insert_rowid(),
            instance_id: instance_id.to_string(),
            turn,
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Full ordered transcript for one instance (internal use only)
    pub async fn list(&self, instance_id: &str) -> DbResult<Vec<Turn>> {
        let rows = sqlx::query_as::<_, TurnRow>(
            "SELECT * FROM turns WHERE instance_id = ? ORDER BY turn ASC, id ASC",
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TurnRow::into_domain).collect()
    }

    /// Bulk purge tied to instance deletion
    pub async fn purge(&self, instance_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM turns WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
