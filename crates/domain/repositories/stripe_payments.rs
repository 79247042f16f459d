use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::{
        points_history::InsertPointsHistoryEntity, stripe_payments::InsertStripePaymentEntity,
    },
    repositories::users::SubscriptionActivation,
};

/// Reconciliation writes. The audit row doubles as the de-dup marker, so it
/// must commit or roll back together with the balance update and the journal
/// entry: a failed attempt leaves no marker behind and the event stays
/// retryable.
#[automock]
#[async_trait]
pub trait StripePaymentRepository {
    /// Applies a subscription checkout in one transaction: audit row, user
    /// activation with the gift credit, journal entry. Returns `false` when
    /// the session or intent identifier already exists (redelivered event);
    /// nothing is credited in that case.
    async fn record_subscription_activation(
        &self,
        payment: InsertStripePaymentEntity,
        activation: SubscriptionActivation,
        journal: InsertPointsHistoryEntity,
    ) -> Result<bool>;

    /// Applies a one-time points purchase in one transaction: audit row,
    /// purchased-bucket credit for `user_id`, journal entry. Same `false`
    /// return on a duplicate delivery.
    async fn record_points_purchase(
        &self,
        user_id: Uuid,
        points: i32,
        payment: InsertStripePaymentEntity,
        journal: InsertPointsHistoryEntity,
    ) -> Result<bool>;
}
