use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::presence::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub make: String,
    pub model: String,
    pub plate: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverRating {
    pub average: f64,
    pub count: u32,
}

/// A driver that survived the nearby search filters for one pickup point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub driver: DriverProfile,
    pub distance_km: f64,
    pub average_rating: f64,
    pub rating_count: u32,
    pub estimated_arrival_minutes: u32,
    pub location: GeoPoint,
}
