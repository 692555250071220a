//! Transcript turn types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which agent authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Buyer,
    Seller,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown turn role: {0}")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for TurnRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a negotiation transcript.
///
/// Turn numbers are dense, start at 1, and are shared across both roles.
/// Turns are append-only and internal to the service; they are never
/// returned through an external read interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub instance_id: String,
    pub turn: u32,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!("buyer".parse::<TurnRole>().unwrap(), TurnRole::Buyer);
        assert_eq!("seller".parse::<TurnRole>().unwrap(), TurnRole::Seller);
        assert!("arbiter".parse::<TurnRole>().is_err());
    }
}
