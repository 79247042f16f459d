use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Pro,
    Enterprise,
}

impl Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plan = match self {
            SubscriptionPlan::Pro => "pro",
            SubscriptionPlan::Enterprise => "enterprise",
        };
        write!(f, "{}", plan)
    }
}

impl SubscriptionPlan {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pro" => Some(SubscriptionPlan::Pro),
            "enterprise" => Some(SubscriptionPlan::Enterprise),
            _ => None,
        }
    }
}
