use anyhow::Result;
use backend::usecases::reconciliation::ReconciliationUseCase;
use std::sync::Arc;
use tally::{
    infra::db::{
        postgres::postgres_connection,
        repositories::{
            points_history::PointsHistoryPostgres, stripe_payments::StripePaymentPostgres,
            users::UserPostgres, webhook_events::WebhookEventPostgres,
        },
    },
    payments::stripe_client::StripeClient,
};
use tracing::{error, info};
use worker::{config, reconciliation};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("Worker exited with error: {}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    tally::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&dotenvy_env.database.url)?;
    info!("Postgres connection has been established");

    let db_pool = Arc::new(postgres_pool);

    let user_repository = Arc::new(UserPostgres::new(Arc::clone(&db_pool)));
    let points_history_repository = Arc::new(PointsHistoryPostgres::new(Arc::clone(&db_pool)));
    let payment_repository = Arc::new(StripePaymentPostgres::new(Arc::clone(&db_pool)));
    let webhook_event_repository = Arc::new(WebhookEventPostgres::new(Arc::clone(&db_pool)));

    let stripe_client = Arc::new(StripeClient::new(
        dotenvy_env.stripe.secret_key.clone(),
        dotenvy_env.stripe.webhook_secret.clone(),
    ));

    let reconciliation_usecase = Arc::new(ReconciliationUseCase::new(
        user_repository,
        points_history_repository,
        payment_repository,
        stripe_client,
    ));

    let settings = reconciliation::worker::WorkerSettings {
        poll_interval_secs: dotenvy_env.reconciliation.poll_interval_secs,
        max_attempts: dotenvy_env.reconciliation.max_attempts,
    };

    reconciliation::worker::run(reconciliation_usecase, webhook_event_repository, settings).await
}
