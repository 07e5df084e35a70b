//! Persistence seams used by the engine.
//!
//! Each trait stands in for an external collaborator: the presence table, the
//! ride request table and the driver account service. The in-memory
//! implementations in [`memory`] back the HTTP service and the tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{DriverProfile, DriverRating};
use crate::models::presence::{DriverPresence, GeoPoint};
use crate::models::request::{RequestStatus, RideRequest, StatusChange};

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Inserts or replaces the record keyed by `presence.driver_id`.
    async fn upsert(&self, presence: DriverPresence) -> Result<(), AppError>;

    async fn get(&self, driver_id: Uuid) -> Result<Option<DriverPresence>, AppError>;

    /// Flag-only write. Returns `None` when the driver has never reported.
    async fn set_available(
        &self,
        driver_id: Uuid,
        available: bool,
    ) -> Result<Option<DriverPresence>, AppError>;

    async fn set_online(
        &self,
        driver_id: Uuid,
        online: bool,
    ) -> Result<Option<DriverPresence>, AppError>;

    /// Clears `available` only if the driver is currently online, available
    /// and fresh. Check and write happen as one atomic step.
    async fn reserve(
        &self,
        driver_id: Uuid,
        fresh_since: DateTime<Utc>,
    ) -> Result<Reservation, AppError>;

    /// Online and available drivers whose last ping is not older than `fresh_since`.
    async fn list_online_available(
        &self,
        fresh_since: DateTime<Utc>,
    ) -> Result<Vec<DriverPresence>, AppError>;

    /// Matchable drivers within `radius_km` of `center`, nearest first.
    /// `limit` caps the result only after the radius has been applied.
    async fn list_available_within(
        &self,
        fresh_since: DateTime<Utc>,
        center: GeoPoint,
        radius_km: f64,
        limit: Option<usize>,
    ) -> Result<Vec<DriverPresence>, AppError>;
}

/// Outcome of [`PresenceStore::reserve`].
#[derive(Debug, Clone)]
pub enum Reservation {
    Reserved(DriverPresence),
    /// Offline, busy or stale; the record is returned untouched.
    Unavailable(DriverPresence),
    Missing,
}

/// Outcome of a compare-and-set on request status.
#[derive(Debug, Clone)]
pub enum Transition {
    Applied(RideRequest),
    /// Precondition failed; the record is returned untouched.
    Rejected(RideRequest),
    Missing,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: RideRequest) -> Result<(), AppError>;

    async fn get(&self, request_id: Uuid) -> Result<Option<RideRequest>, AppError>;

    /// Applies `change` only if the current status is one of `from`.
    /// Check and write happen as one atomic step.
    async fn transition(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
        change: StatusChange,
    ) -> Result<Transition, AppError>;

    async fn list_by_passenger(&self, passenger_id: Uuid) -> Result<Vec<RideRequest>, AppError>;

    async fn list_by_driver(&self, driver_id: Uuid) -> Result<Vec<RideRequest>, AppError>;

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<RideRequest>, AppError>;

    /// Sets `deleted_at` if unset. Returns `None` for unknown ids.
    async fn mark_deleted(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<RideRequest>, AppError>;
}

#[async_trait]
pub trait DriverDirectory: Send + Sync {
    async fn profile(&self, driver_id: Uuid) -> Result<Option<DriverProfile>, AppError>;

    async fn rating(&self, driver_id: Uuid) -> Result<DriverRating, AppError>;
}
