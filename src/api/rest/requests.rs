use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::rest::{json_body, path_params};
use crate::engine::estimate::TripEstimate;
use crate::engine::matching::{MatchOutcome, RequestSnapshot, RideRequestInput};
use crate::error::AppError;
use crate::models::request::{RequestStatus, RideRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/find-best-match", post(find_best_match))
        .route("/create-request", post(create_request))
        .route("/request/:id/status", get(request_status))
        .route("/request/:id", delete(cancel_request))
        .route("/request/:id/archive", post(archive_request))
        .route("/passenger/:id/requests", get(passenger_requests))
}

async fn find_best_match(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RideRequestInput>, JsonRejection>,
) -> Result<Json<MatchOutcome>, AppError> {
    Ok(Json(state.matching.find_best_match(json_body(payload)?).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRequest {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub estimate: TripEstimate,
    pub expiry_time: DateTime<Utc>,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RideRequestInput>, JsonRejection>,
) -> Result<Json<CreatedRequest>, AppError> {
    let request = state.matching.create_request(json_body(payload)?).await?;

    Ok(Json(CreatedRequest {
        request_id: request.id,
        status: request.status,
        estimate: TripEstimate {
            distance_km: request.estimated_distance_km,
            duration_minutes: request.estimated_duration_minutes,
            cost: request.estimated_cost,
        },
        expiry_time: request.expiry_time,
    }))
}

async fn request_status(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RequestSnapshot>, AppError> {
    Ok(Json(state.matching.get_status(path_params(id)?).await?))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RideRequest>, AppError> {
    Ok(Json(state.matching.cancel(path_params(id)?).await?))
}

async fn archive_request(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RideRequest>, AppError> {
    Ok(Json(state.matching.archive(path_params(id)?).await?))
}

async fn passenger_requests(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<RideRequest>>, AppError> {
    Ok(Json(state.matching.passenger_history(path_params(id)?).await?))
}
