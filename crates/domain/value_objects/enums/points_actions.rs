use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Reason tag carried by every ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PointsAction {
    Register,
    Purchase,
    SubscriptionGift,
    SubscriptionExpired,
    Manual,
    DailyLogin,
    Referral,
    Use,
}

impl Display for PointsAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            PointsAction::Register => "register",
            PointsAction::Purchase => "purchase",
            PointsAction::SubscriptionGift => "subscription_gift",
            PointsAction::SubscriptionExpired => "subscription_expired",
            PointsAction::Manual => "manual",
            PointsAction::DailyLogin => "daily_login",
            PointsAction::Referral => "referral",
            PointsAction::Use => "use",
        };
        write!(f, "{}", value)
    }
}

impl PointsAction {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "register" => Some(PointsAction::Register),
            "purchase" => Some(PointsAction::Purchase),
            "subscription_gift" => Some(PointsAction::SubscriptionGift),
            "subscription_expired" => Some(PointsAction::SubscriptionExpired),
            "manual" => Some(PointsAction::Manual),
            "daily_login" => Some(PointsAction::DailyLogin),
            "referral" => Some(PointsAction::Referral),
            "use" => Some(PointsAction::Use),
            _ => None,
        }
    }

    /// Default audit note when the caller does not supply one.
    pub fn default_description(&self) -> &'static str {
        match self {
            PointsAction::Register => "New user registration bonus",
            PointsAction::Purchase => "Points purchase",
            PointsAction::SubscriptionGift => "Subscription gift points",
            PointsAction::SubscriptionExpired => "Gifted points cleared on subscription expiry",
            PointsAction::Manual => "Manual adjustment",
            PointsAction::DailyLogin => "Daily login bonus",
            PointsAction::Referral => "Referral bonus",
            PointsAction::Use => "Points spent",
        }
    }
}
