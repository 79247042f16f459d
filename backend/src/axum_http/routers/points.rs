use crate::{
    auth::AuthUser,
    axum_http::error_responses::error_body,
    usecases::points::{PointsError, PointsUseCase},
};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tally::{
    domain::{
        repositories::{points_history::PointsHistoryRepository, users::UserRepository},
        value_objects::points::{DeductPointsModel, UsePointsModel},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{points_history::PointsHistoryPostgres, users::UserPostgres},
    },
};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let user_repository = UserPostgres::new(Arc::clone(&db_pool));
    let points_history_repository = PointsHistoryPostgres::new(Arc::clone(&db_pool));
    let points_usecase = PointsUseCase::new(
        Arc::new(user_repository),
        Arc::new(points_history_repository),
    );

    Router::new()
        .route("/", get(get_points))
        .route("/history", get(get_points_history))
        .route("/deduct", post(deduct_points))
        .route("/use", post(use_points))
        .with_state(Arc::new(points_usecase))
}

fn to_response(err: PointsError, context: &str) -> Response {
    error!(error = %err, "points: {context} failed");
    let status = err.status_code();
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "Internal server error".to_string()
    } else {
        err.to_string()
    };
    error_body(status, message).into_response()
}

pub async fn get_points<U, H>(
    State(points_usecase): State<Arc<PointsUseCase<U, H>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    match points_usecase.get_points_detail(user_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(err) => to_response(err, "balance detail"),
    }
}

pub async fn get_points_history<U, H>(
    State(points_usecase): State<Arc<PointsUseCase<U, H>>>,
    AuthUser { user_id, .. }: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    match points_usecase
        .get_history(user_id, query.page, query.limit)
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => to_response(err, "history page"),
    }
}

pub async fn deduct_points<U, H>(
    State(points_usecase): State<Arc<PointsUseCase<U, H>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(deduct_points_model): Json<DeductPointsModel>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    info!(%user_id, points = deduct_points_model.points, "points: deduct request received");
    match points_usecase
        .deduct_points(user_id, deduct_points_model)
        .await
    {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(err) => to_response(err, "deduct"),
    }
}

pub async fn use_points<U, H>(
    State(points_usecase): State<Arc<PointsUseCase<U, H>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(use_points_model): Json<UsePointsModel>,
) -> impl IntoResponse
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    info!(%user_id, points = use_points_model.points, "points: spend request received");
    match points_usecase.use_points(user_id, use_points_model).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => to_response(err, "spend"),
    }
}
