use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::enums::{
    subscription_plans::SubscriptionPlan, subscription_statuses::SubscriptionStatus,
};

/// Points granted to every freshly registered user (purchased bucket, never
/// expires).
pub const REGISTER_BONUS: i32 = 100;
pub const DAILY_LOGIN_BONUS: i32 = 10;
pub const REFERRAL_BONUS: i32 = 200;
/// Points gifted on every subscription activation or renewal. Also the upper
/// bound on the clawback performed when a single subscription cycle lapses.
pub const SUBSCRIPTION_GIFT: i32 = 10_000;
/// Rolling extension applied per paid cycle instead of adopting the
/// provider's own period boundary.
pub const SUBSCRIPTION_EXTENSION_DAYS: i64 = 30;

/// Balance snapshot served by the read endpoints, after lazy expiry
/// correction has run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PointsDetailDto {
    pub total_points: i32,
    pub purchased_points: i32,
    pub gifted_points: i32,
    pub subscription_status: SubscriptionStatus,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub subscription_current_period_end: Option<DateTime<Utc>>,
}

/// Result of a bucket-aware spend: gifted points are drained before purchased
/// ones so the forfeit-on-expiry balance is consumed first.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsePointsOutcome {
    pub points_used: i32,
    pub gifted_points_used: i32,
    pub purchased_points_used: i32,
    pub remaining_points: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointsHistoryItemDto {
    pub id: Uuid,
    pub points: i32,
    pub points_type: String,
    pub action: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationDto {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub items_per_page: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointsHistoryPageDto {
    pub history: Vec<PointsHistoryItemDto>,
    pub pagination: PaginationDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeductPointsModel {
    pub points: i32,
    pub description: String,
    #[serde(rename = "type")]
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsePointsModel {
    pub points: i32,
    pub description: String,
}
