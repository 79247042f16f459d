use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Which balance bucket a ledger entry affects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PointsType {
    /// Bought with money or granted as a permanent bonus; never expires.
    Purchased,
    /// Granted as a subscription perk; forfeited when the subscription lapses.
    Gifted,
}

impl Display for PointsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            PointsType::Purchased => "purchased",
            PointsType::Gifted => "gifted",
        };
        write!(f, "{}", value)
    }
}

impl PointsType {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "purchased" => Some(PointsType::Purchased),
            "gifted" => Some(PointsType::Gifted),
            _ => None,
        }
    }
}
