use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentType {
    Subscription,
    PointsPurchase,
}

impl Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            PaymentType::Subscription => "subscription",
            PaymentType::PointsPurchase => "points_purchase",
        };
        write!(f, "{}", value)
    }
}
