use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::users::{InsertUserEntity, UserEntity},
    value_objects::enums::{
        points_types::PointsType, subscription_plans::SubscriptionPlan,
        subscription_statuses::SubscriptionStatus,
    },
};

/// Everything a completed subscription checkout writes onto the user row:
/// provider identifiers, status, plan, period end and the gift credit.
/// Applied transactionally by the payment repository.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionActivation {
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub plan: SubscriptionPlan,
    pub period_end: DateTime<Utc>,
    pub gift_points: i32,
}

/// Balance mutations are expressed as guarded single-statement updates; the
/// `usize` returns are rows affected, so `0` means the guard did not match
/// (insufficient balance, stale snapshot, or a row already corrected by a
/// concurrent caller).
#[automock]
#[async_trait]
pub trait UserRepository {
    async fn insert_user(&self, new_user: InsertUserEntity) -> Result<UserEntity>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>>;

    async fn find_by_subscription_id(&self, subscription_id: &str)
    -> Result<Option<UserEntity>>;

    /// `points += amount` plus the matching bucket column, in one statement.
    async fn credit_points(&self, user_id: Uuid, amount: i32, bucket: PointsType)
    -> Result<usize>;

    /// `points -= amount` guarded by `points >= amount`. Does not touch the
    /// bucket columns.
    async fn debit_total_points(&self, user_id: Uuid, amount: i32) -> Result<usize>;

    /// Bucket-split debit, compare-and-swapped against the observed balances
    /// so a concurrent mutation makes the guard miss instead of losing an
    /// update.
    async fn debit_split_points(
        &self,
        user_id: Uuid,
        observed_points: i32,
        observed_gifted: i32,
        gifted_used: i32,
        purchased_used: i32,
    ) -> Result<usize>;

    async fn update_subscription_period(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<usize>;

    /// Cancellation clawback: removes `clawback` from both `points` and
    /// `gifted_points`, guarded on the observed gifted balance.
    async fn cancel_subscription(
        &self,
        user_id: Uuid,
        observed_gifted: i32,
        clawback: i32,
    ) -> Result<usize>;

    /// Lazy expiry correction: flips an active-but-lapsed row to expired and
    /// zeroes the gifted bucket. Guarded on status and the observed gifted
    /// balance so the transition happens exactly once.
    async fn expire_subscription(&self, user_id: Uuid, observed_gifted: i32) -> Result<usize>;

    async fn mark_past_due(&self, stripe_customer_id: &str) -> Result<usize>;
}
