use crate::{
    axum_http::error_responses::error_body,
    config::config_model::DotEnvyConfig,
    usecases::{reconciliation::StripeGateway, stripe_webhook::WebhookIngressUseCase},
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde_json::json;
use std::sync::Arc;
use tally::{
    domain::repositories::webhook_events::WebhookEventRepository,
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::webhook_events::WebhookEventPostgres,
    },
    payments::stripe_client::StripeClient,
};
use tracing::{error, warn};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let webhook_event_repository = WebhookEventPostgres::new(Arc::clone(&db_pool));
    let stripe_client = StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.webhook_secret.clone(),
    );
    let ingress_usecase = WebhookIngressUseCase::new(
        Arc::new(webhook_event_repository),
        Arc::new(stripe_client),
    );

    Router::new()
        .route("/", post(handle_webhook))
        .with_state(Arc::new(ingress_usecase))
}

pub async fn handle_webhook<W, S>(
    State(ingress_usecase): State<Arc<WebhookIngressUseCase<W, S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    W: WebhookEventRepository + Send + Sync + 'static,
    S: StripeGateway + Send + Sync + 'static,
{
    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
    else {
        warn!("stripe webhook request without signature header");
        return error_body(
            StatusCode::BAD_REQUEST,
            "missing stripe-signature header".to_string(),
        )
        .into_response();
    };

    match ingress_usecase.ingest(&body, signature).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(err) => {
            error!(error = %err, "stripe webhook ingress failed");
            let status = err.status_code();
            let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                "Internal server error".to_string()
            } else {
                err.to_string()
            };
            error_body(status, message).into_response()
        }
    }
}
