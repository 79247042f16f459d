use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::value_objects::enums::{
    subscription_plans::SubscriptionPlan, subscription_statuses::SubscriptionStatus,
};

/// Subscription view returned by `GET /api/v1/subscription`, after lazy
/// expiry correction.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionDetailDto {
    pub subscription_status: SubscriptionStatus,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub subscription_current_period_end: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
}
