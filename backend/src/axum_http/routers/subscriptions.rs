use crate::{
    auth::AuthUser,
    axum_http::error_responses::error_body,
    usecases::points::PointsUseCase,
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use tally::{
    domain::repositories::{points_history::PointsHistoryRepository, users::UserRepository},
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{points_history::PointsHistoryPostgres, users::UserPostgres},
    },
};
use tracing::error;

// The subscription view shares the points usecase so both read paths run the
// same lazy expiry correction.
pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let user_repository = UserPostgres::new(Arc::clone(&db_pool));
    let points_history_repository = PointsHistoryPostgres::new(Arc::clone(&db_pool));
    let points_usecase = PointsUseCase::new(
        Arc::new(user_repository),
        Arc::new(points_history_repository),
    );

    Router::new()
        .route("/", get(get_current_subscription))
        .with_state(Arc::new(points_usecase))
}

pub async fn get_current_subscription<U, H>(
    State(points_usecase): State<Arc<PointsUseCase<U, H>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    match points_usecase.get_subscription_detail(user_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(err) => {
            error!(%user_id, error = %err, "subscriptions: detail request failed");
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
