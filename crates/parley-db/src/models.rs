//! Row types and their domain conversions

use chrono::{DateTime, Utc};
use parley_types::{Instance, Turn};

use crate::error::{DbError, DbResult};

/// Raw `instances` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstanceRow {
    pub id: String,
    pub status: String,
    pub buyer_address: String,
    pub buyer_requirement: String,
    pub buyer_prompt: Option<String>,
    pub max_payment: f64,
    pub seller_address: Option<String>,
    pub seller_info: Option<String>,
    pub seller_proof: Option<String>,
    pub seller_prompt: Option<String>,
    pub model: String,
    pub max_turns: i64,
    pub outcome: Option<String>,
    pub final_price: Option<f64>,
    pub outcome_reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl InstanceRow {
    pub fn into_domain(self) -> DbResult<Instance> {
        let max_turns = u32::try_from(self.max_turns)
            .map_err(|_| DbError::Decode(format!("max_turns out of range: {}", self.max_turns)))?;

        Ok(Instance {
            id: self.id,
            status: self.status.parse()?,
            buyer_address: self.buyer_address,
            buyer_requirement: self.buyer_requirement,
            buyer_prompt: self.buyer_prompt,
            max_payment: self.max_payment,
            seller_address: self.seller_address,
            seller_info: self.seller_info,
            seller_proof: self.seller_proof,
            seller_prompt: self.seller_prompt,
            model: self.model,
            max_turns,
            outcome: self.outcome.as_deref().map(str::parse).transpose()?,
            final_price: self.final_price,
            outcome_reasoning: self.outcome_reasoning,
            created_at: self.created_at,
            committed_at: self.committed_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// Raw `turns` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TurnRow {
    pub id: i64,
    pub instance_id: String,
    pub turn: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TurnRow {
    pub fn into_domain(self) -> DbResult<Turn> {
        let turn = u32::try_from(self.turn)
            .map_err(|_| DbError::Decode(format!("turn number out of range: {}", self.turn)))?;

        Ok(Turn {
            id: self.id,
            instance_id: self.instance_id,
            turn,
            role: self.role.parse()?,
            content: self.content,
            created_at: self.created_at,
        })
    }
}
