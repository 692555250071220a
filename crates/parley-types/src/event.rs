//! Progress events emitted by a negotiation run

use serde::{Deserialize, Serialize};

use crate::outcome::{Decision, Outcome};

/// Which agent is being invoked for the announced turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SellerPresenting,
    BuyerEvaluating,
    SellerResponding,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SellerPresenting => "seller_presenting",
            Self::BuyerEvaluating => "buyer_evaluating",
            Self::SellerResponding => "seller_responding",
        }
    }
}

/// Event stream contract for one run: any number of `Progress` events
/// followed by exactly one terminal `Complete` or `Error`.
///
/// A `Progress` event for a turn is emitted before the agent is invoked;
/// the terminal instance transition is persisted before the terminal event
/// is emitted, so an observer holding a terminal event can rely on the
/// stored row reflecting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        turn: u32,
        phase: Phase,
    },
    Complete {
        outcome: Decision,
        #[serde(skip_serializing_if = "Option::is_none")]
        price: Option<f64>,
        reasoning: String,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn progress(turn: u32, phase: Phase) -> Self {
        Self::Progress { turn, phase }
    }

    pub fn complete(outcome: &Outcome) -> Self {
        Self::Complete {
            outcome: outcome.decision,
            price: outcome.price,
            reasoning: outcome.reasoning.clone(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Terminal events end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Wire name used as the SSE event field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_shape() {
        let event = ProgressEvent::progress(1, Phase::SellerPresenting);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["data"]["turn"], 1);
        assert_eq!(json["data"]["phase"], "seller_presenting");
    }

    #[test]
    fn test_complete_event_omits_missing_price() {
        let event = ProgressEvent::complete(&Outcome::reject("no deal"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["outcome"], "REJECT");
        assert!(json["data"].get("price").is_none());
    }

    #[test]
    fn test_terminality() {
        assert!(!ProgressEvent::progress(2, Phase::BuyerEvaluating).is_terminal());
        assert!(ProgressEvent::error("boom").is_terminal());
        assert!(ProgressEvent::complete(&Outcome::accept(5.0, "ok")).is_terminal());
    }
}
