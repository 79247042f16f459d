use std::sync::Arc;

use chrono::Utc;
use tally::domain::{
    entities::webhook_events::InsertWebhookEventEntity,
    repositories::webhook_events::WebhookEventRepository,
    value_objects::enums::webhook_event_statuses::WebhookEventStatus,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::usecases::reconciliation::{HANDLED_EVENT_TYPES, StripeGateway};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("event id is missing")]
    MissingEventId,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WebhookError::InvalidSignature | WebhookError::MissingEventId => {
                StatusCode::BAD_REQUEST
            }
            // A 5xx makes the provider redeliver; the outbox's unique event
            // id keeps that safe.
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, WebhookError>;

/// Webhook ingress: verify the signature, persist the event into the outbox
/// and acknowledge immediately. All ledger work happens in the worker.
pub struct WebhookIngressUseCase<W, S>
where
    W: WebhookEventRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    webhook_event_repo: Arc<W>,
    stripe_client: Arc<S>,
}

impl<W, S> WebhookIngressUseCase<W, S>
where
    W: WebhookEventRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    pub fn new(webhook_event_repo: Arc<W>, stripe_client: Arc<S>) -> Self {
        Self {
            webhook_event_repo,
            stripe_client,
        }
    }

    pub async fn ingest(&self, payload: &[u8], signature: &str) -> UseCaseResult<()> {
        let event = self
            .stripe_client
            .verify_webhook_signature(payload, signature)
            .map_err(|_| WebhookError::InvalidSignature)?;

        if !HANDLED_EVENT_TYPES.contains(&event.type_.as_str()) {
            debug!(event_type = %event.type_, "acknowledging unhandled event type");
            return Ok(());
        }

        let event_id = event.id.clone().ok_or(WebhookError::MissingEventId)?;

        let payload_json: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| WebhookError::Internal(e.into()))?;

        let enqueued = self
            .webhook_event_repo
            .enqueue(InsertWebhookEventEntity {
                event_id: event_id.clone(),
                event_type: event.type_.clone(),
                payload: payload_json,
                status: WebhookEventStatus::Queued.to_string(),
                attempts: 0,
                run_at: Utc::now(),
            })
            .await?;

        if enqueued {
            info!(%event_id, event_type = %event.type_, "webhook event enqueued");
        } else {
            info!(%event_id, "webhook event already enqueued, acknowledging redelivery");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::reconciliation::MockStripeGateway;
    use serde_json::json;
    use tally::domain::repositories::webhook_events::MockWebhookEventRepository;
    use tally::payments::stripe_client::StripeEvent;

    fn verified_event(event_type: &str) -> StripeEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "data": {"object": {}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn enqueues_handled_event() {
        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_verify_webhook_signature()
            .returning(|_, _| Ok(verified_event("invoice.payment_failed")));

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo
            .expect_enqueue()
            .withf(|event| {
                event.event_id == "evt_1"
                    && event.event_type == "invoice.payment_failed"
                    && event.status == "queued"
            })
            .times(1)
            .returning(|_| Ok(true));

        let usecase = WebhookIngressUseCase::new(Arc::new(webhook_repo), Arc::new(gateway));
        let payload = br#"{"id":"evt_1","type":"invoice.payment_failed","data":{"object":{}}}"#;

        usecase.ingest(payload, "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_signature_without_enqueue() {
        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_verify_webhook_signature()
            .returning(|_, _| Err(anyhow::anyhow!("invalid webhook signature")));

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_enqueue().times(0);

        let usecase = WebhookIngressUseCase::new(Arc::new(webhook_repo), Arc::new(gateway));
        let result = usecase.ingest(b"{}", "t=1,v1=bad").await;

        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[tokio::test]
    async fn acknowledges_unhandled_event_without_enqueue() {
        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_verify_webhook_signature()
            .returning(|_, _| Ok(verified_event("charge.refunded")));

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_enqueue().times(0);

        let usecase = WebhookIngressUseCase::new(Arc::new(webhook_repo), Arc::new(gateway));
        let payload = br#"{"id":"evt_1","type":"charge.refunded","data":{"object":{}}}"#;

        usecase.ingest(payload, "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn redelivered_event_is_acknowledged() {
        let mut gateway = MockStripeGateway::new();
        gateway
            .expect_verify_webhook_signature()
            .returning(|_, _| Ok(verified_event("customer.subscription.deleted")));

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_enqueue().returning(|_| Ok(false));

        let usecase = WebhookIngressUseCase::new(Arc::new(webhook_repo), Arc::new(gateway));
        let payload =
            br#"{"id":"evt_1","type":"customer.subscription.deleted","data":{"object":{}}}"#;

        let result = usecase.ingest(payload, "t=1,v1=sig").await;
        assert!(result.is_ok());
    }
}
