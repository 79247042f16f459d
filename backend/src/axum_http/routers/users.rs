use crate::{
    axum_http::error_responses::error_body,
    usecases::accounts::{AccountUseCase, RegisterModel},
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde_json::json;
use std::sync::Arc;
use tally::{
    domain::repositories::{points_history::PointsHistoryRepository, users::UserRepository},
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{points_history::PointsHistoryPostgres, users::UserPostgres},
    },
};
use tracing::error;

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let user_repository = UserPostgres::new(Arc::clone(&db_pool));
    let points_history_repository = PointsHistoryPostgres::new(Arc::clone(&db_pool));
    let account_usecase = AccountUseCase::new(
        Arc::new(user_repository),
        Arc::new(points_history_repository),
    );

    Router::new()
        .route("/register", post(register))
        .with_state(Arc::new(account_usecase))
}

pub async fn register<U, H>(
    State(account_usecase): State<Arc<AccountUseCase<U, H>>>,
    Json(register_model): Json<RegisterModel>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    match account_usecase.register(register_model).await {
        Ok(user_id) => (StatusCode::CREATED, Json(json!({ "id": user_id }))).into_response(),
        Err(err) => {
            error!(error = %err, "users: registration failed");
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
