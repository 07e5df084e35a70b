use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{json_body, path_params};
use crate::error::AppError;
use crate::models::presence::{DriverPresence, GeoPoint, LocationUpdate};
use crate::models::request::RideRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/driver/:id/location",
            put(update_location).get(get_location),
        )
        .route("/driver/:id/availability", put(update_availability))
        .route("/driver/:id/offline", post(go_offline))
        .route("/driver/:id/requests", get(driver_requests))
        .route("/driver/:id/accept/:request_id", post(accept_request))
        .route("/driver/:id/reject/:request_id", post(reject_request))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
}

fn default_available() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available: bool,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateLocationRequest>, JsonRejection>,
) -> Result<Json<DriverPresence>, AppError> {
    let id = path_params(id)?;
    let payload = json_body(payload)?;
    let update = LocationUpdate {
        driver_id: id,
        location: GeoPoint::new(payload.latitude, payload.longitude)?,
        available: payload.available,
        address: payload.address,
        speed: payload.speed,
        heading: payload.heading,
    };

    Ok(Json(state.presence.update_location(update).await?))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DriverPresence>, AppError> {
    let id = path_params(id)?;
    state
        .presence
        .get_location(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no location reported for driver {id}")))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateAvailabilityRequest>, JsonRejection>,
) -> Result<Json<DriverPresence>, AppError> {
    let id = path_params(id)?;
    let payload = json_body(payload)?;
    state
        .presence
        .set_availability(id, payload.available)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no location reported for driver {id}")))
}

async fn go_offline(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DriverPresence>, AppError> {
    let id = path_params(id)?;
    state
        .presence
        .go_offline(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no location reported for driver {id}")))
}

async fn driver_requests(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<RideRequest>>, AppError> {
    Ok(Json(state.matching.driver_history(path_params(id)?).await?))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<Json<RideRequest>, AppError> {
    let (id, request_id) = path_params(ids)?;
    Ok(Json(state.matching.accept(id, request_id).await?))
}

async fn reject_request(
    State(state): State<Arc<AppState>>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<Json<RideRequest>, AppError> {
    let (id, request_id) = path_params(ids)?;
    Ok(Json(state.matching.reject(id, request_id).await?))
}
