pub mod drivers;
pub mod requests;
pub mod search;
pub mod ws;

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::matching::ActiveRequestStats;
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(search::router())
        .merge(requests::router())
        .merge(drivers::router())
        .route("/statistics/active-requests", get(active_requests))
        .route("/statistics/available-drivers", get(available_drivers))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Maps malformed query strings onto the JSON validation error.
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|err| AppError::Validation(err.body_text()))
}

/// Same as [`query_params`] for request bodies.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(payload)| payload)
        .map_err(|err| AppError::Validation(err.body_text()))
}

pub(crate) fn path_params<T>(path: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    path.map(|Path(params)| params)
        .map_err(|err| AppError::Validation(err.body_text()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    available_drivers: usize,
    active_requests: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        available_drivers: state.matching.available_drivers().await?,
        active_requests: state.matching.active_requests().await?.total,
    }))
}

async fn active_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveRequestStats>, AppError> {
    Ok(Json(state.matching.active_requests().await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailableDriversResponse {
    available_drivers: usize,
}

async fn available_drivers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AvailableDriversResponse>, AppError> {
    Ok(Json(AvailableDriversResponse {
        available_drivers: state.matching.available_drivers().await?,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
