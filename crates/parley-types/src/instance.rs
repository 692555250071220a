//! Instance lifecycle types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::outcome::Decision;

/// Fallback model when a request does not name one
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324";

/// Default turn budget for a negotiation
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Lifecycle status of a negotiation instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Buyer has published a requirement; no seller yet
    Created,
    /// Seller has committed confidential content
    Committed,
    /// Negotiation is in progress
    Running,
    /// Negotiation concluded with an outcome
    Completed,
    /// Negotiation aborted; confidential fields redacted
    Failed,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Committed => "committed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Error for unrecognized status strings coming out of storage
#[derive(Debug, Error)]
#[error("unknown instance status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for InstanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "committed" => Ok(Self::Committed),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One negotiation unit: a buyer requirement matched against a seller's
/// confidential offering, negotiated by agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub status: InstanceStatus,

    // Buyer side, immutable after creation
    pub buyer_address: String,
    pub buyer_requirement: String,
    pub buyer_prompt: Option<String>,
    pub max_payment: f64,

    // Seller side, set once at commit; redacted on non-acceptance terminals
    pub seller_address: Option<String>,
    pub seller_info: Option<String>,
    pub seller_proof: Option<String>,
    pub seller_prompt: Option<String>,

    // Run configuration
    pub model: String,
    pub max_turns: u32,

    // Outcome, set exactly once at completion
    pub outcome: Option<Decision>,
    pub final_price: Option<f64>,
    pub outcome_reasoning: Option<String>,

    // Status-entry timestamps
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Whether the given address is the buyer or the committed seller
    pub fn is_participant(&self, address: &str) -> bool {
        self.buyer_address == address || self.seller_address.as_deref() == Some(address)
    }

    /// Whether confidential seller data is present
    pub fn has_seller_data(&self) -> bool {
        self.seller_info.is_some() && self.seller_proof.is_some()
    }
}

/// Buyer input at instance creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstance {
    pub buyer_requirement: String,
    #[serde(default)]
    pub buyer_prompt: Option<String>,
    pub max_payment: f64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
}

/// Seller input at commit time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInstance {
    pub seller_info: String,
    pub seller_proof: String,
    #[serde(default)]
    pub seller_prompt: Option<String>,
}

/// Generate a fresh opaque instance id
pub fn new_instance_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            InstanceStatus::Created,
            InstanceStatus::Committed,
            InstanceStatus::Running,
            InstanceStatus::Completed,
            InstanceStatus::Failed,
        ] {
            let parsed: InstanceStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<InstanceStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Failed.is_terminal());
        assert!(!InstanceStatus::Running.is_terminal());
        assert!(!InstanceStatus::Created.is_terminal());
    }

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(new_instance_id(), new_instance_id());
    }
}
