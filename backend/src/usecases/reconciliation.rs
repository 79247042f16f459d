use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tally::{
    domain::{
        entities::{
            points_history::InsertPointsHistoryEntity, stripe_payments::InsertStripePaymentEntity,
        },
        repositories::{
            points_history::PointsHistoryRepository,
            stripe_payments::StripePaymentRepository,
            users::{SubscriptionActivation, UserRepository},
        },
        value_objects::{
            enums::{
                payment_statuses::PaymentStatus, payment_types::PaymentType,
                points_actions::PointsAction, points_types::PointsType,
                subscription_plans::SubscriptionPlan, subscription_statuses::SubscriptionStatus,
            },
            points::{SUBSCRIPTION_EXTENSION_DAYS, SUBSCRIPTION_GIFT},
        },
    },
    payments::stripe_client::{
        StripeCheckoutSession, StripeClient, StripeCustomer, StripeEvent, StripeSubscription,
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Event types the outbox accepts. Everything else is acknowledged at the
/// edge and never enqueued.
pub const HANDLED_EVENT_TYPES: [&str; 5] = [
    "checkout.session.completed",
    "payment_intent.succeeded",
    "customer.subscription.updated",
    "customer.subscription.deleted",
    "invoice.payment_failed",
];

const METADATA_POINTS_PURCHASE: &str = "points_purchase";
const MAX_BALANCE_RETRIES: usize = 3;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription>;

    async fn retrieve_customer(&self, customer_id: &str) -> AnyResult<StripeCustomer>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }

    async fn retrieve_customer(&self, customer_id: &str) -> AnyResult<StripeCustomer> {
        self.retrieve_customer(customer_id).await
    }
}

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
    #[error("user not found for event: {0}")]
    UserNotFound(String),
    #[error("balance changed concurrently while reconciling")]
    Conflict,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type UseCaseResult<T> = std::result::Result<T, ReconciliationError>;

/// Applies one verified billing event to the ledger. Every handler is
/// idempotent: redeliveries are absorbed either by the payment audit table's
/// unique constraints or by guarded single-shot updates.
pub struct ReconciliationUseCase<U, H, P, S>
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
    P: StripePaymentRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    points_history_repo: Arc<H>,
    payment_repo: Arc<P>,
    stripe_client: Arc<S>,
}

impl<U, H, P, S> ReconciliationUseCase<U, H, P, S>
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
    P: StripePaymentRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        points_history_repo: Arc<H>,
        payment_repo: Arc<P>,
        stripe_client: Arc<S>,
    ) -> Self {
        Self {
            user_repo,
            points_history_repo,
            payment_repo,
            stripe_client,
        }
    }

    pub async fn process_event(&self, event: &StripeEvent) -> UseCaseResult<()> {
        match event.type_.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(event).await,
            "payment_intent.succeeded" => self.handle_payment_intent_succeeded(event).await,
            "customer.subscription.updated" => self.handle_subscription_updated(event).await,
            "customer.subscription.deleted" => self.handle_subscription_deleted(event).await,
            "invoice.payment_failed" => self.handle_invoice_payment_failed(event).await,
            other => {
                debug!(event_type = %other, "ignoring unhandled event type");
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let session = StripeClient::extract_checkout_session(&event.data.object).ok_or_else(
            || ReconciliationError::InvalidPayload("checkout session object".to_string()),
        )?;

        match session.mode.as_deref() {
            Some("subscription") => self.handle_subscription_checkout(event, session).await,
            Some("payment") => self.handle_points_checkout(event, session).await,
            other => {
                debug!(mode = ?other, "ignoring checkout session mode");
                Ok(())
            }
        }
    }

    async fn handle_subscription_checkout(
        &self,
        event: &StripeEvent,
        session: StripeCheckoutSession,
    ) -> UseCaseResult<()> {
        let session_id = session
            .id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidPayload("missing session id".to_string()))?;
        let subscription_id = session.subscription.clone().ok_or_else(|| {
            ReconciliationError::InvalidPayload("missing subscription id".to_string())
        })?;
        let customer_id = session.customer.clone().ok_or_else(|| {
            ReconciliationError::InvalidPayload("missing customer id".to_string())
        })?;
        let plan = session
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("plan"))
            .and_then(|plan| SubscriptionPlan::from_str(plan))
            .unwrap_or(SubscriptionPlan::Pro);

        // Checkout sessions for subscriptions are keyed to the payer's
        // email; fall back to a customer lookup when the session omits it.
        let email = match session
            .customer_details
            .as_ref()
            .and_then(|details| details.email.clone())
        {
            Some(email) => email,
            None => self
                .stripe_client
                .retrieve_customer(&customer_id)
                .await?
                .email
                .ok_or_else(|| {
                    ReconciliationError::InvalidPayload("customer has no email".to_string())
                })?,
        };

        let user = self
            .user_repo
            .find_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or_else(|| ReconciliationError::UserNotFound(email.clone()))?;
        let user_id = user.id;

        let remote = self
            .stripe_client
            .retrieve_subscription(&subscription_id)
            .await?;

        // A paid cycle extends a live subscription from its stored period
        // end; anything else (first activation, lapsed, canceled) restarts
        // the window from the subscription's creation time.
        let now = Utc::now();
        let status = SubscriptionStatus::from_str(&user.subscription_status);
        let period_end = match (status, user.subscription_current_period_end) {
            (SubscriptionStatus::Active, Some(end)) if end > now => {
                end + Duration::days(SUBSCRIPTION_EXTENSION_DAYS)
            }
            _ => {
                let base = remote
                    .created
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                    .unwrap_or(now);
                base + Duration::days(SUBSCRIPTION_EXTENSION_DAYS)
            }
        };

        let payment = InsertStripePaymentEntity {
            user_id,
            stripe_customer_id: Some(customer_id.clone()),
            payment_intent_id: session.payment_intent.clone(),
            checkout_session_id: Some(session_id.clone()),
            subscription_id: Some(subscription_id.clone()),
            payment_status: PaymentStatus::Succeeded.to_string(),
            payment_type: PaymentType::Subscription.to_string(),
            amount_minor: session.amount_total.unwrap_or(0),
            currency: session.currency.clone().unwrap_or_else(|| "usd".to_string()),
            points_amount: Some(SUBSCRIPTION_GIFT),
            points_type: Some(PointsType::Gifted.to_string()),
            subscription_plan: Some(plan.to_string()),
            period_start: Some(now),
            period_end: Some(period_end),
            product_name: None,
            webhook_event_id: event.id.clone(),
        };
        let activation = SubscriptionActivation {
            user_id,
            stripe_customer_id: customer_id,
            subscription_id,
            status: SubscriptionStatus::Active,
            plan,
            period_end,
            gift_points: SUBSCRIPTION_GIFT,
        };
        let journal = InsertPointsHistoryEntity {
            user_id,
            points: SUBSCRIPTION_GIFT,
            points_type: PointsType::Gifted.to_string(),
            action: PointsAction::SubscriptionGift.to_string(),
            description: PointsAction::SubscriptionGift
                .default_description()
                .to_string(),
        };

        // One transaction: a failed activation rolls the de-dup row back so
        // the worker's retry can reconcile instead of seeing a duplicate.
        let applied = self
            .payment_repo
            .record_subscription_activation(payment, activation, journal)
            .await?;
        if !applied {
            info!(%session_id, "duplicate subscription checkout delivery, skipping");
            return Ok(());
        }

        info!(%user_id, %period_end, "subscription activated with gift points");
        Ok(())
    }

    async fn handle_points_checkout(
        &self,
        event: &StripeEvent,
        session: StripeCheckoutSession,
    ) -> UseCaseResult<()> {
        let purchase_type = session
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("type"))
            .map(String::as_str);
        if purchase_type != Some(METADATA_POINTS_PURCHASE) {
            debug!("ignoring payment-mode checkout without points metadata");
            return Ok(());
        }

        let session_id = session
            .id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidPayload("missing session id".to_string()))?;
        let user_id = metadata_user_id(&session)?;
        let points = metadata_points(session.metadata.as_ref())?;

        let payment = InsertStripePaymentEntity {
            user_id,
            stripe_customer_id: session.customer.clone(),
            payment_intent_id: session.payment_intent.clone(),
            checkout_session_id: Some(session_id.clone()),
            subscription_id: None,
            payment_status: PaymentStatus::Succeeded.to_string(),
            payment_type: PaymentType::PointsPurchase.to_string(),
            amount_minor: session.amount_total.unwrap_or(0),
            currency: session.currency.clone().unwrap_or_else(|| "usd".to_string()),
            points_amount: Some(points),
            points_type: Some(PointsType::Purchased.to_string()),
            subscription_plan: None,
            period_start: None,
            period_end: None,
            product_name: None,
            webhook_event_id: event.id.clone(),
        };

        let applied = self
            .payment_repo
            .record_points_purchase(user_id, points, payment, purchase_journal(user_id, points))
            .await?;
        if !applied {
            info!(%session_id, "duplicate points checkout delivery, skipping");
            return Ok(());
        }

        info!(%user_id, points, "purchased points credited");
        Ok(())
    }

    async fn handle_payment_intent_succeeded(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let intent = StripeClient::extract_payment_intent(&event.data.object).ok_or_else(
            || ReconciliationError::InvalidPayload("payment intent object".to_string()),
        )?;

        let purchase_type = intent
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("type"))
            .map(String::as_str);
        if purchase_type != Some(METADATA_POINTS_PURCHASE) {
            debug!("ignoring payment intent without points metadata");
            return Ok(());
        }

        let intent_id = intent
            .id
            .clone()
            .ok_or_else(|| ReconciliationError::InvalidPayload("missing intent id".to_string()))?;
        let user_id = intent
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("user_id"))
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| {
                ReconciliationError::InvalidPayload("missing or invalid user_id".to_string())
            })?;
        let points = metadata_points(intent.metadata.as_ref())?;

        // The unique constraint on payment_intent_id also collapses this
        // against a payment-mode checkout session carrying the same intent.
        let payment = InsertStripePaymentEntity {
            user_id,
            stripe_customer_id: intent.customer.clone(),
            payment_intent_id: Some(intent_id.clone()),
            checkout_session_id: None,
            subscription_id: None,
            payment_status: PaymentStatus::Succeeded.to_string(),
            payment_type: PaymentType::PointsPurchase.to_string(),
            amount_minor: intent.amount.unwrap_or(0),
            currency: intent.currency.clone().unwrap_or_else(|| "usd".to_string()),
            points_amount: Some(points),
            points_type: Some(PointsType::Purchased.to_string()),
            subscription_plan: None,
            period_start: None,
            period_end: None,
            product_name: None,
            webhook_event_id: event.id.clone(),
        };

        let applied = self
            .payment_repo
            .record_points_purchase(user_id, points, payment, purchase_journal(user_id, points))
            .await?;
        if !applied {
            info!(%intent_id, "duplicate payment intent delivery, skipping");
            return Ok(());
        }

        info!(%user_id, points, "purchased points credited");
        Ok(())
    }

    async fn handle_subscription_updated(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let subscription = StripeClient::extract_subscription(&event.data.object).ok_or_else(
            || ReconciliationError::InvalidPayload("subscription object".to_string()),
        )?;
        let subscription_id = subscription.id.clone().ok_or_else(|| {
            ReconciliationError::InvalidPayload("missing subscription id".to_string())
        })?;

        let Some(user) = self
            .user_repo
            .find_by_subscription_id(&subscription_id)
            .await?
        else {
            warn!(%subscription_id, "subscription update for unknown subscription, ignoring");
            return Ok(());
        };

        // The event payload can be stale by the time the outbox replays it;
        // the retrieve endpoint is authoritative.
        let remote = self
            .stripe_client
            .retrieve_subscription(&subscription_id)
            .await?;

        let status = remote
            .status
            .as_deref()
            .map(SubscriptionStatus::from_stripe)
            .unwrap_or_else(|| SubscriptionStatus::from_str(&user.subscription_status));

        // The rolling 30-day extension can put the local period end past the
        // provider's. It stays authoritative only while the subscription is
        // still locally active; after that the provider's boundary wins.
        let remote_end = remote
            .period_end()
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        let locally_active =
            SubscriptionStatus::from_str(&user.subscription_status) == SubscriptionStatus::Active;
        let period_end = match (user.subscription_current_period_end, remote_end) {
            (Some(local), Some(remote)) if locally_active => Some(local.max(remote)),
            (local, None) => local,
            (_, remote) => remote,
        };

        self.user_repo
            .update_subscription_period(&subscription_id, status, period_end)
            .await?;

        info!(%subscription_id, status = %status, "subscription period reconciled");
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let subscription = StripeClient::extract_subscription(&event.data.object).ok_or_else(
            || ReconciliationError::InvalidPayload("subscription object".to_string()),
        )?;
        let subscription_id = subscription.id.clone().ok_or_else(|| {
            ReconciliationError::InvalidPayload("missing subscription id".to_string())
        })?;

        let Some(mut user) = self
            .user_repo
            .find_by_subscription_id(&subscription_id)
            .await?
        else {
            warn!(%subscription_id, "subscription deletion for unknown subscription, ignoring");
            return Ok(());
        };

        for _ in 0..MAX_BALANCE_RETRIES {
            // Only the current cycle's gift is clawed back; gifted points
            // carried over from earlier cycles beyond one gift stay intact.
            let clawback = user.gifted_points.min(SUBSCRIPTION_GIFT);

            let rows = self
                .user_repo
                .cancel_subscription(user.id, user.gifted_points, clawback)
                .await?;

            if rows == 1 {
                if clawback > 0 {
                    self.points_history_repo
                        .insert_entry(InsertPointsHistoryEntity {
                            user_id: user.id,
                            points: -clawback,
                            points_type: PointsType::Gifted.to_string(),
                            action: PointsAction::SubscriptionExpired.to_string(),
                            description: "Gifted points clawed back on subscription cancellation"
                                .to_string(),
                        })
                        .await?;
                }
                info!(user_id = %user.id, clawback, "subscription canceled");
                return Ok(());
            }

            user = self
                .user_repo
                .find_by_id(user.id)
                .await?
                .ok_or_else(|| ReconciliationError::UserNotFound(user.id.to_string()))?;
        }

        Err(ReconciliationError::Conflict)
    }

    async fn handle_invoice_payment_failed(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let invoice = StripeClient::extract_invoice(&event.data.object).ok_or_else(|| {
            ReconciliationError::InvalidPayload("invoice object".to_string())
        })?;
        let customer_id = invoice.customer.ok_or_else(|| {
            ReconciliationError::InvalidPayload("missing customer id".to_string())
        })?;

        let rows = self.user_repo.mark_past_due(&customer_id).await?;
        if rows == 0 {
            warn!(%customer_id, "payment failure for unknown customer, ignoring");
        } else {
            info!(%customer_id, "subscription marked past due");
        }

        Ok(())
    }
}

fn purchase_journal(user_id: Uuid, points: i32) -> InsertPointsHistoryEntity {
    InsertPointsHistoryEntity {
        user_id,
        points,
        points_type: PointsType::Purchased.to_string(),
        action: PointsAction::Purchase.to_string(),
        description: PointsAction::Purchase.default_description().to_string(),
    }
}

fn metadata_user_id(session: &StripeCheckoutSession) -> UseCaseResult<Uuid> {
    session
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.get("user_id"))
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            ReconciliationError::InvalidPayload("missing or invalid user_id".to_string())
        })
}

fn metadata_points(
    metadata: Option<&std::collections::HashMap<String, String>>,
) -> UseCaseResult<i32> {
    let points = metadata
        .and_then(|metadata| metadata.get("points"))
        .and_then(|raw| raw.parse::<i32>().ok())
        .ok_or_else(|| {
            ReconciliationError::InvalidPayload("missing or invalid points".to_string())
        })?;

    if points <= 0 {
        return Err(ReconciliationError::InvalidPayload(
            "points must be a positive number".to_string(),
        ));
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally::domain::entities::users::UserEntity;
    use tally::domain::repositories::{
        points_history::MockPointsHistoryRepository, stripe_payments::MockStripePaymentRepository,
        users::MockUserRepository,
    };

    fn test_user(user_id: Uuid) -> UserEntity {
        UserEntity {
            id: user_id,
            email: "user@example.com".to_string(),
            name: None,
            points: 100,
            purchased_points: 100,
            gifted_points: 0,
            stripe_customer_id: None,
            subscription_id: None,
            subscription_status: SubscriptionStatus::Free.to_string(),
            subscription_plan: None,
            subscription_current_period_end: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn checkout_event(email: &str) -> StripeEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_1",
                    "mode": "subscription",
                    "subscription": "sub_1",
                    "customer": "cus_1",
                    "customer_details": {"email": email},
                    "amount_total": 2000,
                    "currency": "usd",
                    "metadata": {"plan": "pro"}
                }
            }
        }))
        .unwrap()
    }

    fn remote_subscription(created: i64) -> StripeSubscription {
        serde_json::from_value(json!({
            "id": "sub_1",
            "status": "active",
            "created": created,
            "current_period_end": created + 86_400
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_activation_runs_from_subscription_creation() {
        let user_id = Uuid::new_v4();
        let created = Utc::now().timestamp() - 60;

        let mut user_repo = MockUserRepository::new();
        let user = test_user(user_id);
        user_repo
            .expect_find_by_email()
            .withf(|email| email == "user@example.com")
            .returning(move |_| Ok(Some(user.clone())));

        let history_repo = MockPointsHistoryRepository::new();

        let mut payment_repo = MockStripePaymentRepository::new();
        payment_repo
            .expect_record_subscription_activation()
            .withf(move |payment, activation, journal| {
                let expected_end = Utc.timestamp_opt(created, 0).single().unwrap()
                    + Duration::days(SUBSCRIPTION_EXTENSION_DAYS);
                payment.checkout_session_id.as_deref() == Some("cs_1")
                    && activation.user_id == user_id
                    && activation.gift_points == SUBSCRIPTION_GIFT
                    && activation.period_end == expected_end
                    && activation.status == SubscriptionStatus::Active
                    && journal.points == SUBSCRIPTION_GIFT
                    && journal.points_type == "gifted"
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_retrieve_subscription()
            .returning(move |_| Ok(remote_subscription(created)));

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase
            .process_event(&checkout_event("user@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn checkout_retry_after_failed_attempt_still_activates() {
        let user_id = Uuid::new_v4();
        let created = Utc::now().timestamp() - 60;

        let mut user_repo = MockUserRepository::new();
        let user = test_user(user_id);
        user_repo
            .expect_find_by_email()
            .returning(move |_| Ok(Some(user.clone())));

        // First attempt dies mid-write; the rollback means the retry must
        // be offered the activation again instead of a duplicate marker.
        let mut outcomes = vec![
            Err(anyhow::anyhow!("connection reset")),
            Ok(true),
        ]
        .into_iter();
        let mut payment_repo = MockStripePaymentRepository::new();
        payment_repo
            .expect_record_subscription_activation()
            .times(2)
            .returning(move |_, _, _| outcomes.next().unwrap());

        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_retrieve_subscription()
            .returning(move |_| Ok(remote_subscription(created)));

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(MockPointsHistoryRepository::new()),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        let event = checkout_event("user@example.com");
        assert!(usecase.process_event(&event).await.is_err());
        usecase.process_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn renewal_extends_stored_period_end() {
        let user_id = Uuid::new_v4();
        let stored_end = Utc::now() + Duration::days(5);

        let mut user = test_user(user_id);
        user.subscription_status = SubscriptionStatus::Active.to_string();
        user.subscription_id = Some("sub_1".to_string());
        user.subscription_current_period_end = Some(stored_end);

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_find_by_email()
            .returning(move |_| Ok(Some(user.clone())));

        let history_repo = MockPointsHistoryRepository::new();

        let mut payment_repo = MockStripePaymentRepository::new();
        payment_repo
            .expect_record_subscription_activation()
            .withf(move |_, activation, _| {
                activation.period_end == stored_end + Duration::days(SUBSCRIPTION_EXTENSION_DAYS)
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_retrieve_subscription()
            .returning(|_| Ok(remote_subscription(0)));

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase
            .process_event(&checkout_event("user@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_checkout_delivery_does_not_credit_twice() {
        let user_id = Uuid::new_v4();

        let mut user_repo = MockUserRepository::new();
        let user = test_user(user_id);
        user_repo
            .expect_find_by_email()
            .returning(move |_| Ok(Some(user.clone())));

        let history_repo = MockPointsHistoryRepository::new();

        let mut payment_repo = MockStripePaymentRepository::new();
        payment_repo
            .expect_record_subscription_activation()
            .times(1)
            .returning(|_, _, _| Ok(false));

        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_retrieve_subscription()
            .returning(|_| Ok(remote_subscription(0)));

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase
            .process_event(&checkout_event("user@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn payment_intent_credits_purchased_points() {
        let user_id = Uuid::new_v4();
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_2",
            "type": "payment_intent.succeeded",
            "data": {
                "object": {
                    "id": "pi_1",
                    "customer": "cus_1",
                    "amount": 500,
                    "currency": "usd",
                    "metadata": {
                        "type": "points_purchase",
                        "user_id": user_id.to_string(),
                        "points": "5000"
                    }
                }
            }
        }))
        .unwrap();

        let user_repo = MockUserRepository::new();
        let history_repo = MockPointsHistoryRepository::new();

        let mut payment_repo = MockStripePaymentRepository::new();
        payment_repo
            .expect_record_points_purchase()
            .withf(move |id, points, payment, journal| {
                *id == user_id
                    && *points == 5000
                    && payment.payment_intent_id.as_deref() == Some("pi_1")
                    && payment.amount_minor == 500
                    && journal.action == "purchase"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(true));

        let gateway = MockStripeGateway::new();

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase.process_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn subscription_update_keeps_later_local_period_end() {
        let local_end = Utc::now() + Duration::days(25);
        let remote_ts = (Utc::now() + Duration::days(3)).timestamp();

        let mut user = test_user(Uuid::new_v4());
        user.subscription_status = SubscriptionStatus::Active.to_string();
        user.subscription_id = Some("sub_1".to_string());
        user.subscription_current_period_end = Some(local_end);

        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_3",
            "type": "customer.subscription.updated",
            "data": {
                "object": {
                    "id": "sub_1",
                    "status": "active",
                    "current_period_end": remote_ts
                }
            }
        }))
        .unwrap();

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_find_by_subscription_id()
            .returning(move |_| Ok(Some(user.clone())));
        user_repo
            .expect_update_subscription_period()
            .withf(move |subscription_id, status, period_end| {
                subscription_id == "sub_1"
                    && *status == SubscriptionStatus::Active
                    && *period_end == Some(local_end)
            })
            .times(1)
            .returning(|_, _, _| Ok(1));

        let history_repo = MockPointsHistoryRepository::new();
        let payment_repo = MockStripePaymentRepository::new();
        let mut gateway = MockStripeGateway::new();
        gateway.expect_retrieve_subscription().returning(move |_| {
            Ok(serde_json::from_value(json!({
                "id": "sub_1",
                "status": "active",
                "current_period_end": remote_ts
            }))
            .unwrap())
        });

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase.process_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn subscription_update_adopts_remote_end_when_not_active() {
        let local_end = Utc::now() + Duration::days(25);
        let remote_ts = (Utc::now() + Duration::days(3)).timestamp();
        let remote_end = Utc.timestamp_opt(remote_ts, 0).single().unwrap();

        let mut user = test_user(Uuid::new_v4());
        user.subscription_status = SubscriptionStatus::PastDue.to_string();
        user.subscription_id = Some("sub_1".to_string());
        user.subscription_current_period_end = Some(local_end);

        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_8",
            "type": "customer.subscription.updated",
            "data": {
                "object": {
                    "id": "sub_1",
                    "status": "past_due",
                    "current_period_end": remote_ts
                }
            }
        }))
        .unwrap();

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_find_by_subscription_id()
            .returning(move |_| Ok(Some(user.clone())));
        user_repo
            .expect_update_subscription_period()
            .withf(move |_, status, period_end| {
                *status == SubscriptionStatus::PastDue && *period_end == Some(remote_end)
            })
            .times(1)
            .returning(|_, _, _| Ok(1));

        let mut gateway = MockStripeGateway::new();
        gateway.expect_retrieve_subscription().returning(move |_| {
            Ok(serde_json::from_value(json!({
                "id": "sub_1",
                "status": "past_due",
                "current_period_end": remote_ts
            }))
            .unwrap())
        });

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(MockPointsHistoryRepository::new()),
            Arc::new(MockStripePaymentRepository::new()),
            Arc::new(gateway),
        );

        usecase.process_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn deletion_clawback_is_capped_at_one_gift() {
        let user_id = Uuid::new_v4();
        let mut user = test_user(user_id);
        user.subscription_status = SubscriptionStatus::Active.to_string();
        user.subscription_id = Some("sub_1".to_string());
        user.points = 25_000;
        user.gifted_points = 20_000;
        user.purchased_points = 5_000;

        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_4",
            "type": "customer.subscription.deleted",
            "data": {"object": {"id": "sub_1", "status": "canceled"}}
        }))
        .unwrap();

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_find_by_subscription_id()
            .returning(move |_| Ok(Some(user.clone())));
        user_repo
            .expect_cancel_subscription()
            .withf(move |id, observed_gifted, clawback| {
                *id == user_id && *observed_gifted == 20_000 && *clawback == SUBSCRIPTION_GIFT
            })
            .times(1)
            .returning(|_, _, _| Ok(1));

        let mut history_repo = MockPointsHistoryRepository::new();
        history_repo
            .expect_insert_entry()
            .withf(|entry| entry.points == -SUBSCRIPTION_GIFT && entry.points_type == "gifted")
            .times(1)
            .returning(|_| Ok(Uuid::new_v4()));

        let payment_repo = MockStripePaymentRepository::new();
        let gateway = MockStripeGateway::new();

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase.process_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn deletion_with_no_gifted_points_skips_journal() {
        let user_id = Uuid::new_v4();
        let mut user = test_user(user_id);
        user.subscription_status = SubscriptionStatus::Active.to_string();
        user.subscription_id = Some("sub_1".to_string());

        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_5",
            "type": "customer.subscription.deleted",
            "data": {"object": {"id": "sub_1"}}
        }))
        .unwrap();

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_find_by_subscription_id()
            .returning(move |_| Ok(Some(user.clone())));
        user_repo
            .expect_cancel_subscription()
            .withf(|_, observed_gifted, clawback| *observed_gifted == 0 && *clawback == 0)
            .returning(|_, _, _| Ok(1));

        let mut history_repo = MockPointsHistoryRepository::new();
        history_repo.expect_insert_entry().times(0);

        let payment_repo = MockStripePaymentRepository::new();
        let gateway = MockStripeGateway::new();

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase.process_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn invoice_payment_failure_marks_customer_past_due() {
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_6",
            "type": "invoice.payment_failed",
            "data": {"object": {"id": "in_1", "customer": "cus_9"}}
        }))
        .unwrap();

        let mut user_repo = MockUserRepository::new();
        user_repo
            .expect_mark_past_due()
            .withf(|customer_id| customer_id == "cus_9")
            .times(1)
            .returning(|_| Ok(1));

        let history_repo = MockPointsHistoryRepository::new();
        let payment_repo = MockStripePaymentRepository::new();
        let gateway = MockStripeGateway::new();

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase.process_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn unhandled_event_type_is_a_no_op() {
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_7",
            "type": "charge.refunded",
            "data": {"object": {}}
        }))
        .unwrap();

        let user_repo = MockUserRepository::new();
        let history_repo = MockPointsHistoryRepository::new();
        let payment_repo = MockStripePaymentRepository::new();
        let gateway = MockStripeGateway::new();

        let usecase = ReconciliationUseCase::new(
            Arc::new(user_repo),
            Arc::new(history_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
        );

        usecase.process_event(&event).await.unwrap();
    }
}
