//! Read views over instances
//!
//! The participant view is the confidentiality boundary: `seller_info` is
//! attached only when the outcome is ACCEPT and the viewer is the buyer.
//! The decision is made here, at construction, so no handler can leak the
//! field by serializing first and filtering after.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::instance::{Instance, InstanceStatus};
use crate::outcome::Decision;

/// Discovery view, visible to any caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicInstanceView {
    pub id: String,
    pub status: InstanceStatus,
    pub buyer_requirement: String,
    pub max_payment: f64,
    pub created_at: DateTime<Utc>,
}

impl PublicInstanceView {
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            id: instance.id.clone(),
            status: instance.status,
            buyer_requirement: instance.buyer_requirement.clone(),
            max_payment: instance.max_payment,
            created_at: instance.created_at,
        }
    }
}

/// View for negotiation participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInstanceView {
    pub id: String,
    pub status: InstanceStatus,
    pub buyer_requirement: String,
    pub max_payment: f64,
    pub created_at: DateTime<Utc>,
    pub buyer_address: String,
    pub seller_address: Option<String>,
    pub outcome: Option<Decision>,
    pub final_price: Option<f64>,
    pub outcome_reasoning: Option<String>,
    /// Present only for the buyer of an accepted instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_info: Option<String>,
}

impl ParticipantInstanceView {
    /// Build the view as seen by `viewer_address`.
    ///
    /// `seller_proof` is never exposed through any view.
    pub fn for_viewer(instance: &Instance, viewer_address: &str) -> Self {
        let seller_info = if instance.outcome == Some(Decision::Accept)
            && viewer_address == instance.buyer_address
        {
            instance.seller_info.clone()
        } else {
            None
        };

        Self {
            id: instance.id.clone(),
            status: instance.status,
            buyer_requirement: instance.buyer_requirement.clone(),
            max_payment: instance.max_payment,
            created_at: instance.created_at,
            buyer_address: instance.buyer_address.clone(),
            seller_address: instance.seller_address.clone(),
            outcome: instance.outcome,
            final_price: instance.final_price,
            outcome_reasoning: instance.outcome_reasoning.clone(),
            seller_info,
        }
    }
}
