use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::presence::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected | RequestStatus::Cancelled | RequestStatus::Expired
        )
    }

    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;

        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Accepted, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Waiting for a driver to accept the request",
            RequestStatus::Accepted => "A driver has accepted the request and is on the way",
            RequestStatus::Rejected => "The request was rejected by a driver",
            RequestStatus::Cancelled => "The request was cancelled",
            RequestStatus::Expired => "No driver accepted the request in time",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideConstraints {
    pub max_wait_time_minutes: u32,
    pub min_rating: Option<f64>,
    pub max_distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub pickup_address: Option<String>,
    pub dropoff: GeoPoint,
    pub dropoff_address: Option<String>,
    pub estimated_cost: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: u32,
    pub status: RequestStatus,
    pub request_time: DateTime<Utc>,
    pub accepted_time: Option<DateTime<Utc>>,
    pub expiry_time: DateTime<Utc>,
    pub constraints: RideConstraints,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RideRequest {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending && self.expiry_time <= now
    }

    /// Status as readers must see it: an overdue Pending request is already Expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> RequestStatus {
        if self.is_overdue(now) {
            RequestStatus::Expired
        } else {
            self.status
        }
    }

    pub fn observed_at(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }
}

/// Write applied by a guarded status transition.
#[derive(Debug, Clone, Copy)]
pub struct StatusChange {
    pub to: RequestStatus,
    pub driver_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn apply(&self, request: &mut RideRequest) {
        request.status = self.to;
        if let Some(driver_id) = self.driver_id {
            request.driver_id = Some(driver_id);
        }
        if self.to == RequestStatus::Accepted {
            request.accepted_time = Some(self.at);
        }
        request.updated_at = self.at;
    }
}

/// Lifecycle notification broadcast to websocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub driver_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl From<&RideRequest> for RequestEvent {
    fn from(request: &RideRequest) -> Self {
        Self {
            request_id: request.id,
            status: request.status,
            driver_id: request.driver_id,
            at: request.updated_at,
        }
    }
}
