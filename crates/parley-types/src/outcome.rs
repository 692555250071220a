//! Negotiation outcome types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The buyer's terminal decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown decision: {0}")]
pub struct ParseDecisionError(pub String);

impl std::str::FromStr for Decision {
    type Err = ParseDecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPT" => Ok(Self::Accept),
            "REJECT" => Ok(Self::Reject),
            other => Err(ParseDecisionError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a negotiation run.
///
/// `price` is present only on acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub reasoning: String,
}

impl Outcome {
    pub fn accept(price: f64, reasoning: impl Into<String>) -> Self {
        Self {
            decision: Decision::Accept,
            price: Some(price),
            reasoning: reasoning.into(),
        }
    }

    pub fn reject(reasoning: impl Into<String>) -> Self {
        Self {
            decision: Decision::Reject,
            price: None,
            reasoning: reasoning.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_round_trip() {
        assert_eq!("ACCEPT".parse::<Decision>().unwrap(), Decision::Accept);
        assert_eq!("REJECT".parse::<Decision>().unwrap(), Decision::Reject);
        assert!("MAYBE".parse::<Decision>().is_err());
    }

    #[test]
    fn test_accept_carries_price() {
        let outcome = Outcome::accept(80.0, "good value");
        assert_eq!(outcome.decision, Decision::Accept);
        assert_eq!(outcome.price, Some(80.0));

        let outcome = Outcome::reject("too vague");
        assert_eq!(outcome.price, None);
    }
}
