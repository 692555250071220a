//! Instance repository
//!
//! Every lifecycle transition is a single conditional UPDATE guarded on the
//! current status (plus identity checks); `rows_affected` is the only
//! success signal and zero affected rows is reported as `Ok(None)` — a
//! precondition conflict for the caller to branch on, not an error. This
//! conditional write is the sole concurrency control over an instance:
//! racing callers resolve to exactly one winner without any lock.

use chrono::Utc;
use sqlx::SqlitePool;

use parley_types::{
    new_instance_id, CommitInstance, CreateInstance, Decision, Instance, InstanceStatus, Outcome,
    DEFAULT_MAX_TURNS, DEFAULT_MODEL,
};

use crate::error::{DbError, DbResult};
use crate::models::InstanceRow;

pub struct InstanceRepo {
    pool: SqlitePool,
}

impl InstanceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new instance in `created` status for the given buyer
    pub async fn create(&self, input: &CreateInstance, buyer_address: &str) -> DbResult<Instance> {
        let id = new_instance_id();
        let now = Utc::now();
        let model = input.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_turns = i64::from(input.max_turns.unwrap_or(DEFAULT_MAX_TURNS));

        sqlx::query(
            r#"
            INSERT INTO instances
                (id, status, buyer_address, buyer_requirement, buyer_prompt, max_payment,
                 model, max_turns, created_at)
            VALUES (?, 'created', ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(buyer_address)
        .bind(&input.buyer_requirement)
        .bind(&input.buyer_prompt)
        .bind(input.max_payment)
        .bind(&model)
        .bind(max_turns)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("instance {id} vanished after insert")))
    }

    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Instance>> {
        let row = sqlx::query_as::<_, InstanceRow>("SELECT * FROM instances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(InstanceRow::into_domain).transpose()
    }

    /// List instances, newest first, optionally filtered by status
    pub async fn list(&self, status: Option<InstanceStatus>) -> DbResult<Vec<Instance>> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, InstanceRow>(
                "SELECT * FROM instances WHERE status = ? ORDER BY created_at DESC",
            )
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, InstanceRow>("SELECT * FROM instances ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(InstanceRow::into_domain).collect()
    }

    /// Instances where the address participates, split by side
    pub async fn list_by_address(
        &self,
        address: &str,
    ) -> DbResult<(Vec<Instance>, Vec<Instance>)> {
        let as_buyer = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM instances WHERE buyer_address = ? ORDER BY created_at DESC",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(InstanceRow::into_domain)
        .collect::<DbResult<Vec<_>>>()?;

        let as_seller = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM instances WHERE seller_address = ? ORDER BY created_at DESC",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(InstanceRow::into_domain)
        .collect::<DbResult<Vec<_>>>()?;

        Ok((as_buyer, as_seller))
    }

    /// created -> committed. Guard: status = created, seller is not the buyer.
    pub async fn commit(
        &self,
        id: &str,
        input: &CommitInstance,
        seller_address: &str,
    ) -> DbResult<Option<Instance>> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE instances
            SET seller_address = ?, seller_info = ?, seller_proof = ?, seller_prompt = ?,
                status = 'committed', committed_at = ?
            WHERE id = ? AND status = 'created' AND buyer_address != ?
            "#,
        )
        .bind(seller_address)
        .bind(&input.seller_info)
        .bind(&input.seller_proof)
        .bind(&input.seller_prompt)
        .bind(now)
        .bind(id)
        .bind(seller_address)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    /// committed -> running. Guard: status = committed, caller is the buyer.
    pub async fn start(&self, id: &str, buyer_address: &str) -> DbResult<Option<Instance>> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE instances
            SET status = 'running', started_at = ?
            WHERE id = ? AND status = 'committed' AND buyer_address = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(buyer_address)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    /// running -> completed. On REJECT the confidential seller fields are
    /// nulled inside the same statement; the redaction and the status change
    /// are never observable separately.
    pub async fn complete(&self, id: &str, outcome: &Outcome) -> DbResult<Option<Instance>> {
        let now = Utc::now();

        let result = match outcome.decision {
            Decision::Accept => {
                sqlx::query(
                    r#"
                    UPDATE instances
                    SET status = 'completed', outcome = ?, final_price = ?,
                        outcome_reasoning = ?, completed_at = ?
                    WHERE id = ? AND status = 'running'
                    "#,
                )
                .bind(outcome.decision.as_str())
                .bind(outcome.price)
                .bind(&outcome.reasoning)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            Decision::Reject => {
                sqlx::query(
                    r#"
                    UPDATE instances
                    SET status = 'completed', outcome = ?, final_price = NULL,
                        outcome_reasoning = ?, completed_at = ?,
                        seller_info = NULL, seller_proof = NULL
                    WHERE id = ? AND status = 'running'
                    "#,
                )
                .bind(outcome.decision.as_str())
                .bind(&outcome.reasoning)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    /// running -> failed. Redacts confidential seller fields in the same
    /// statement.
    pub async fn fail(&self, id: &str, reason: &str) -> DbResult<Option<Instance>> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE instances
            SET status = 'failed', outcome_reasoning = ?, completed_at = ?,
                seller_info = NULL, seller_proof = NULL
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    /// Buyer cancellation of an uncommitted instance. Guard: status =
    /// created, caller is the buyer. Returns whether a row was deleted.
    pub async fn delete(&self, id: &str, buyer_address: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM instances WHERE id = ? AND buyer_address = ? AND status = 'created'",
        )
        .bind(id)
        .bind(buyer_address)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn create_input() -> CreateInstance {
        CreateInstance {
            buyer_requirement: "weather data for region X".to_string(),
            buyer_prompt: None,
            max_payment: 100.0,
            model: None,
            max_turns: None,
        }
    }

    fn commit_input() -> CommitInstance {
        CommitInstance {
            seller_info: "the secret".to_string(),
            seller_proof: "the proof".to_string(),
            seller_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();

        assert_eq!(instance.status, InstanceStatus::Created);
        assert_eq!(instance.buyer_address, "0xbuyer");
        assert_eq!(instance.model, DEFAULT_MODEL);
        assert_eq!(instance.max_turns, DEFAULT_MAX_TURNS);
        assert!(instance.seller_info.is_none());
        assert!(instance.outcome.is_none());
    }

    #[tokio::test]
    async fn test_commit_rejects_self_dealing() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();

        let result = repo
            .commit(&instance.id, &commit_input(), "0xbuyer")
            .await
            .unwrap();
        assert!(result.is_none());

        // And the guard holds in every status, not just created
        repo.commit(&instance.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();
        let result = repo
            .commit(&instance.id, &commit_input(), "0xbuyer")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_commit_single_winner() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();
        let repo2 = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();
        let id = instance.id.clone();
        let id2 = instance.id.clone();

        let commit_a = commit_input();
        let commit_b = commit_input();
        let (a, b) = tokio::join!(
            repo.commit(&id, &commit_a, "0xseller-a"),
            repo2.commit(&id2, &commit_b, "0xseller-b"),
        );

        let winners = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|r| r.is_some())
            .count();
        assert_eq!(winners, 1);

        let committed = repo.find_by_id(&instance.id).await.unwrap().unwrap();
        assert_eq!(committed.status, InstanceStatus::Committed);
    }

    #[tokio::test]
    async fn test_start_guards_caller_and_status() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();

        // Not committed yet
        assert!(repo.start(&instance.id, "0xbuyer").await.unwrap().is_none());

        repo.commit(&instance.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();

        // Only the buyer may start
        assert!(repo
            .start(&instance.id, "0xseller")
            .await
            .unwrap()
            .is_none());

        let running = repo.start(&instance.id, "0xbuyer").await.unwrap().unwrap();
        assert_eq!(running.status, InstanceStatus::Running);

        // Second start loses: the committed status was consumed
        assert!(repo.start(&instance.id, "0xbuyer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_accept_keeps_seller_data() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();
        repo.commit(&instance.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();
        repo.start(&instance.id, "0xbuyer").await.unwrap().unwrap();

        let completed = repo
            .complete(&instance.id, &Outcome::accept(80.0, "good value"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(completed.status, InstanceStatus::Completed);
        assert_eq!(completed.outcome, Some(Decision::Accept));
        assert_eq!(completed.final_price, Some(80.0));
        assert_eq!(completed.seller_info.as_deref(), Some("the secret"));
        assert_eq!(completed.seller_proof.as_deref(), Some("the proof"));
    }

    #[tokio::test]
    async fn test_complete_reject_redacts_seller_data() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();
        repo.commit(&instance.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();
        repo.start(&instance.id, "0xbuyer").await.unwrap().unwrap();

        let completed = repo
            .complete(&instance.id, &Outcome::reject("not credible"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(completed.outcome, Some(Decision::Reject));
        assert!(completed.final_price.is_none());
        assert!(completed.seller_info.is_none());
        assert!(completed.seller_proof.is_none());

        // Redaction is durable across reads
        let reread = repo.find_by_id(&instance.id).await.unwrap().unwrap();
        assert!(reread.seller_info.is_none());
        assert!(reread.seller_proof.is_none());
    }

    #[tokio::test]
    async fn test_fail_redacts_seller_data() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();
        repo.commit(&instance.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();
        repo.start(&instance.id, "0xbuyer").await.unwrap().unwrap();

        let failed = repo
            .fail(&instance.id, "agent timeout")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(failed.status, InstanceStatus::Failed);
        assert!(failed.outcome.is_none());
        assert_eq!(failed.outcome_reasoning.as_deref(), Some("agent timeout"));
        assert!(failed.seller_info.is_none());
        assert!(failed.seller_proof.is_none());
    }

    #[tokio::test]
    async fn test_terminal_states_reject_every_transition() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();
        repo.commit(&instance.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();
        repo.start(&instance.id, "0xbuyer").await.unwrap().unwrap();
        repo.complete(&instance.id, &Outcome::accept(50.0, "deal"))
            .await
            .unwrap()
            .unwrap();

        assert!(repo
            .complete(&instance.id, &Outcome::reject("again"))
            .await
            .unwrap()
            .is_none());
        assert!(repo.fail(&instance.id, "late").await.unwrap().is_none());
        assert!(repo.start(&instance.id, "0xbuyer").await.unwrap().is_none());
        assert!(repo
            .commit(&instance.id, &commit_input(), "0xother")
            .await
            .unwrap()
            .is_none());
        assert!(!repo.delete(&instance.id, "0xbuyer").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_only_before_commitment() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();

        // Wrong caller
        assert!(!repo.delete(&instance.id, "0xother").await.unwrap());
        // Buyer may cancel while created
        assert!(repo.delete(&instance.id, "0xbuyer").await.unwrap());
        assert!(repo.find_by_id(&instance.id).await.unwrap().is_none());

        // Once committed, cancel no longer applies
        let instance = repo.create(&create_input(), "0xbuyer").await.unwrap();
        repo.commit(&instance.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();
        assert!(!repo.delete(&instance.id, "0xbuyer").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_address() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.instance_repo();

        let first = repo.create(&create_input(), "0xbuyer").await.unwrap();
        let second = repo.create(&create_input(), "0xother").await.unwrap();
        repo.commit(&second.id, &commit_input(), "0xseller")
            .await
            .unwrap()
            .unwrap();

        let created = repo.list(Some(InstanceStatus::Created)).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, first.id);

        let all = repo.list(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let (as_buyer, as_seller) = repo.list_by_address("0xseller").await.unwrap();
        assert!(as_buyer.is_empty());
        assert_eq!(as_seller.len(), 1);
        assert_eq!(as_seller[0].id, second.id);
    }
}
