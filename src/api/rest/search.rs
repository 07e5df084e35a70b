use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::api::rest::{json_body, query_params};
use crate::engine::estimate::eta_minutes;
use crate::engine::finder::{NearbyQuery, DEFAULT_MAX_RESULTS, DEFAULT_RADIUS_KM};
use crate::error::AppError;
use crate::geo::{distance_km, round2};
use crate::models::driver::Candidate;
use crate::models::presence::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/nearby-drivers", get(nearby_drivers))
        .route("/find-nearby-drivers", post(find_nearby_drivers))
        .route("/calculate-distance", get(calculate_distance))
        .route("/estimate-arrival", get(estimate_arrival))
        .route("/calculate-cost", get(calculate_cost))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyParams {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub min_rating: Option<f64>,
}

impl NearbyParams {
    fn into_query(self) -> Result<NearbyQuery, AppError> {
        Ok(NearbyQuery {
            pickup: GeoPoint::new(self.latitude, self.longitude)?,
            radius_km: self.radius.unwrap_or(DEFAULT_RADIUS_KM),
            max_results: self.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            min_rating: self.min_rating,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyResponse {
    pub count: usize,
    pub drivers: Vec<Candidate>,
}

async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<Json<NearbyResponse>, AppError> {
    search(&state, query_params(params)?).await
}

async fn find_nearby_drivers(
    State(state): State<Arc<AppState>>,
    params: Result<Json<NearbyParams>, JsonRejection>,
) -> Result<Json<NearbyResponse>, AppError> {
    search(&state, json_body(params)?).await
}

async fn search(state: &AppState, params: NearbyParams) -> Result<Json<NearbyResponse>, AppError> {
    let drivers = state.finder.find_nearby(&params.into_query()?).await?;
    Ok(Json(NearbyResponse {
        count: drivers.len(),
        drivers,
    }))
}

#[derive(Deserialize)]
pub struct DistanceParams {
    pub lat1: f64,
    pub lng1: f64,
    pub lat2: f64,
    pub lng2: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceResponse {
    pub distance_km: f64,
}

async fn calculate_distance(
    params: Result<Query<DistanceParams>, QueryRejection>,
) -> Result<Json<DistanceResponse>, AppError> {
    let params = query_params(params)?;
    let from = GeoPoint::new(params.lat1, params.lng1)?;
    let to = GeoPoint::new(params.lat2, params.lng2)?;

    Ok(Json(DistanceResponse {
        distance_km: round2(distance_km(from.lat, from.lng, to.lat, to.lng)),
    }))
}

#[derive(Deserialize)]
pub struct ArrivalParams {
    pub distance: f64,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalResponse {
    pub eta_minutes: u32,
}

async fn estimate_arrival(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ArrivalParams>, QueryRejection>,
) -> Result<Json<ArrivalResponse>, AppError> {
    let params = query_params(params)?;
    let distance = non_negative("distance", params.distance)?;
    let speed = params.speed.unwrap_or(state.fares.avg_speed_kmh);
    if !speed.is_finite() || speed <= 0.0 {
        return Err(AppError::Validation(format!(
            "speed must be a positive number, got {speed}"
        )));
    }

    Ok(Json(ArrivalResponse {
        eta_minutes: eta_minutes(distance, speed),
    }))
}

#[derive(Deserialize)]
pub struct CostParams {
    pub distance: f64,
    pub duration: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostResponse {
    pub cost: f64,
}

async fn calculate_cost(
    State(state): State<Arc<AppState>>,
    params: Result<Query<CostParams>, QueryRejection>,
) -> Result<Json<CostResponse>, AppError> {
    let params = query_params(params)?;
    let distance = non_negative("distance", params.distance)?;

    Ok(Json(CostResponse {
        cost: state.fares.estimate_cost(distance, params.duration),
    }))
}

fn non_negative(name: &str, value: f64) -> Result<f64, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!(
            "{name} must be a non-negative number, got {value}"
        )));
    }
    Ok(value)
}
