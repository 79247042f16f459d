use anyhow::Result;
use backend::usecases::reconciliation::{ReconciliationUseCase, StripeGateway};
use std::{sync::Arc, time::Duration};
use tally::{
    domain::{
        entities::webhook_events::WebhookEventEntity,
        repositories::{
            points_history::PointsHistoryRepository, stripe_payments::StripePaymentRepository,
            users::UserRepository, webhook_events::WebhookEventRepository,
        },
    },
    payments::stripe_client::StripeEvent,
};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval_secs: u64,
    pub max_attempts: i32,
}

pub async fn run<U, H, P, S, W>(
    usecase: Arc<ReconciliationUseCase<U, H, P, S>>,
    webhook_event_repo: Arc<W>,
    settings: WorkerSettings,
) -> Result<()>
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
    P: StripePaymentRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
    W: WebhookEventRepository + Send + Sync + 'static,
{
    info!("reconciliation: starting worker loop");
    loop {
        match webhook_event_repo.lock_next_due().await {
            Ok(Some(event)) => {
                info!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    attempts = event.attempts,
                    "reconciliation: processing event"
                );
                if let Err(e) = process_webhook_event(&usecase, &event).await {
                    error!(
                        event_id = %event.event_id,
                        error = %e,
                        "reconciliation: failed to process event"
                    );
                    if let Err(mark_err) = webhook_event_repo
                        .mark_failed(event.id, &e.to_string(), settings.max_attempts)
                        .await
                    {
                        error!(
                            event_id = %event.event_id,
                            error = %mark_err,
                            "reconciliation: failed to mark event as failed"
                        );
                    }
                } else if let Err(mark_err) = webhook_event_repo.mark_done(event.id).await {
                    error!(
                        event_id = %event.event_id,
                        error = %mark_err,
                        "reconciliation: failed to mark event as done"
                    );
                } else {
                    info!(event_id = %event.event_id, "reconciliation: event processed successfully");
                }
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_secs(settings.poll_interval_secs)).await;
            }
            Err(e) => {
                error!(error = %e, "reconciliation: error locking next event");
                tokio::time::sleep(Duration::from_secs(settings.poll_interval_secs)).await;
            }
        }
    }
}

async fn process_webhook_event<U, H, P, S>(
    usecase: &Arc<ReconciliationUseCase<U, H, P, S>>,
    event: &WebhookEventEntity,
) -> Result<()>
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
    P: StripePaymentRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let stripe_event: StripeEvent = serde_json::from_value(event.payload.clone())?;
    usecase.process_event(&stripe_event).await?;
    Ok(())
}
