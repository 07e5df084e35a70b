use std::cmp::Ordering;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::driver::{DriverProfile, DriverRating};
use crate::models::presence::{DriverPresence, GeoPoint};
use crate::models::request::{RequestStatus, RideRequest, StatusChange};
use crate::store::{DriverDirectory, PresenceStore, RequestStore, Reservation, Transition};

#[derive(Default)]
pub struct InMemoryPresenceStore {
    drivers: DashMap<Uuid, DriverPresence>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn upsert(&self, presence: DriverPresence) -> Result<(), AppError> {
        self.drivers.insert(presence.driver_id, presence);
        Ok(())
    }

    async fn get(&self, driver_id: Uuid) -> Result<Option<DriverPresence>, AppError> {
        Ok(self.drivers.get(&driver_id).map(|entry| entry.value().clone()))
    }

    async fn set_available(
        &self,
        driver_id: Uuid,
        available: bool,
    ) -> Result<Option<DriverPresence>, AppError> {
        Ok(self.drivers.get_mut(&driver_id).map(|mut presence| {
            presence.available = available;
            presence.clone()
        }))
    }

    async fn set_online(
        &self,
        driver_id: Uuid,
        online: bool,
    ) -> Result<Option<DriverPresence>, AppError> {
        Ok(self.drivers.get_mut(&driver_id).map(|mut presence| {
            presence.online = online;
            presence.clone()
        }))
    }

    async fn reserve(
        &self,
        driver_id: Uuid,
        fresh_since: DateTime<Utc>,
    ) -> Result<Reservation, AppError> {
        let Some(mut presence) = self.drivers.get_mut(&driver_id) else {
            return Ok(Reservation::Missing);
        };

        if !is_listable(&presence, fresh_since) {
            return Ok(Reservation::Unavailable(presence.clone()));
        }

        presence.available = false;
        Ok(Reservation::Reserved(presence.clone()))
    }

    async fn list_online_available(
        &self,
        fresh_since: DateTime<Utc>,
    ) -> Result<Vec<DriverPresence>, AppError> {
        Ok(self
            .drivers
            .iter()
            .filter(|entry| is_listable(entry.value(), fresh_since))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_available_within(
        &self,
        fresh_since: DateTime<Utc>,
        center: GeoPoint,
        radius_km: f64,
        limit: Option<usize>,
    ) -> Result<Vec<DriverPresence>, AppError> {
        let mut nearby: Vec<(f64, DriverPresence)> = self
            .drivers
            .iter()
            .filter(|entry| is_listable(entry.value(), fresh_since))
            .filter_map(|entry| {
                let distance_km = haversine_km(&center, &entry.value().location);
                (distance_km <= radius_km).then(|| (distance_km, entry.value().clone()))
            })
            .collect();

        nearby.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.driver_id.cmp(&b.1.driver_id))
        });
        if let Some(limit) = limit {
            nearby.truncate(limit);
        }

        Ok(nearby.into_iter().map(|(_, presence)| presence).collect())
    }
}

fn is_listable(presence: &DriverPresence, fresh_since: DateTime<Utc>) -> bool {
    presence.online && presence.available && presence.last_update_time >= fresh_since
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: DashMap<Uuid, RideRequest>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_where<F>(&self, predicate: F) -> Vec<RideRequest>
    where
        F: Fn(&RideRequest) -> bool,
    {
        let mut requests: Vec<RideRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.value().deleted_at.is_none() && predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        requests.sort_by(|a, b| b.request_time.cmp(&a.request_time));
        requests
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: RideRequest) -> Result<(), AppError> {
        self.requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<RideRequest>, AppError> {
        Ok(self
            .requests
            .get(&request_id)
            .map(|entry| entry.value().clone()))
    }

    async fn transition(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
        change: StatusChange,
    ) -> Result<Transition, AppError> {
        // The shard write guard is held from the status check until the write lands.
        let Some(mut request) = self.requests.get_mut(&request_id) else {
            return Ok(Transition::Missing);
        };

        if !from.contains(&request.status) || !request.status.can_transition_to(change.to) {
            return Ok(Transition::Rejected(request.clone()));
        }

        change.apply(&mut request);
        Ok(Transition::Applied(request.clone()))
    }

    async fn list_by_passenger(&self, passenger_id: Uuid) -> Result<Vec<RideRequest>, AppError> {
        Ok(self.collect_where(|request| request.passenger_id == passenger_id))
    }

    async fn list_by_driver(&self, driver_id: Uuid) -> Result<Vec<RideRequest>, AppError> {
        Ok(self.collect_where(|request| request.driver_id == Some(driver_id)))
    }

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<RideRequest>, AppError> {
        Ok(self.collect_where(|request| request.status == status))
    }

    async fn mark_deleted(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<RideRequest>, AppError> {
        Ok(self.requests.get_mut(&request_id).map(|mut request| {
            if request.deleted_at.is_none() {
                request.deleted_at = Some(at);
                request.updated_at = at;
            }
            request.clone()
        }))
    }
}

/// One line of the driver directory seed file.
#[derive(Debug, Deserialize)]
pub struct DirectoryEntry {
    pub profile: DriverProfile,
    #[serde(default)]
    pub rating: DriverRating,
}

#[derive(Default)]
pub struct InMemoryDriverDirectory {
    profiles: DashMap<Uuid, DriverProfile>,
    ratings: DashMap<Uuid, DriverRating>,
}

impl InMemoryDriverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON array of [`DirectoryEntry`] values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Storage(format!("failed to read {}: {err}", path.display()))
        })?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&raw).map_err(|err| {
            AppError::Internal(format!("invalid driver directory {}: {err}", path.display()))
        })?;

        let directory = Self::new();
        for entry in entries {
            directory.set_rating(entry.profile.id, entry.rating);
            directory.insert_profile(entry.profile);
        }

        Ok(directory)
    }

    pub fn insert_profile(&self, profile: DriverProfile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn set_rating(&self, driver_id: Uuid, rating: DriverRating) {
        self.ratings.insert(driver_id, rating);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl DriverDirectory for InMemoryDriverDirectory {
    async fn profile(&self, driver_id: Uuid) -> Result<Option<DriverProfile>, AppError> {
        Ok(self
            .profiles
            .get(&driver_id)
            .map(|entry| entry.value().clone()))
    }

    async fn rating(&self, driver_id: Uuid) -> Result<DriverRating, AppError> {
        let rating = self
            .ratings
            .get(&driver_id)
            .map(|entry| *entry.value())
            .unwrap_or_default();

        if rating.count == 0 {
            return Ok(DriverRating::default());
        }

        Ok(rating)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{InMemoryDriverDirectory, InMemoryRequestStore};
    use crate::error::AppError;
    use crate::models::driver::DriverRating;
    use crate::models::presence::GeoPoint;
    use crate::models::request::{RequestStatus, RideConstraints, RideRequest, StatusChange};
    use crate::store::{DriverDirectory, RequestStore, Transition};

    fn pending_request(id: Uuid) -> RideRequest {
        let now = Utc::now();
        RideRequest {
            id,
            passenger_id: Uuid::from_u128(99),
            driver_id: None,
            pickup: GeoPoint { lat: 41.0, lng: 29.0 },
            pickup_address: None,
            dropoff: GeoPoint { lat: 41.05, lng: 29.05 },
            dropoff_address: None,
            estimated_cost: 30.0,
            estimated_distance_km: 7.0,
            estimated_duration_minutes: 14,
            status: RequestStatus::Pending,
            request_time: now,
            accepted_time: None,
            expiry_time: now + Duration::minutes(15),
            constraints: RideConstraints {
                max_wait_time_minutes: 15,
                min_rating: None,
                max_distance_km: 5.0,
            },
            notes: None,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exactly_one_concurrent_transition_wins() {
        let store = Arc::new(InMemoryRequestStore::new());
        let request_id = Uuid::new_v4();
        store.insert(pending_request(request_id)).await.unwrap();

        let mut handles = Vec::new();
        for seed in 1..=16u128 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let change = StatusChange {
                    to: RequestStatus::Accepted,
                    driver_id: Some(Uuid::from_u128(seed)),
                    at: Utc::now(),
                };
                store
                    .transition(request_id, &[RequestStatus::Pending], change)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Transition::Applied(request) = handle.await.unwrap() {
                winners.push(request.driver_id.unwrap());
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = store.get(request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Accepted);
        assert_eq!(stored.driver_id, Some(winners[0]));
    }

    #[tokio::test]
    async fn rejected_transition_leaves_record_untouched() {
        let store = InMemoryRequestStore::new();
        let request_id = Uuid::new_v4();
        let mut request = pending_request(request_id);
        request.status = RequestStatus::Expired;
        store.insert(request.clone()).await.unwrap();

        let change = StatusChange {
            to: RequestStatus::Cancelled,
            driver_id: None,
            at: Utc::now(),
        };
        let outcome = store
            .transition(
                request_id,
                &[RequestStatus::Pending, RequestStatus::Accepted],
                change,
            )
            .await
            .unwrap();

        match outcome {
            Transition::Rejected(current) => assert_eq!(current, request),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.get(request_id).await.unwrap().unwrap(), request);
    }

    #[tokio::test]
    async fn missing_request_is_reported() {
        let store = InMemoryRequestStore::new();
        let change = StatusChange {
            to: RequestStatus::Accepted,
            driver_id: None,
            at: Utc::now(),
        };
        let outcome = store
            .transition(Uuid::new_v4(), &[RequestStatus::Pending], change)
            .await
            .unwrap();
        assert!(matches!(outcome, Transition::Missing));
    }

    #[tokio::test]
    async fn deleted_requests_drop_out_of_history() {
        let store = InMemoryRequestStore::new();
        let request = pending_request(Uuid::new_v4());
        store.insert(request.clone()).await.unwrap();
        assert_eq!(store.list_by_passenger(request.passenger_id).await.unwrap().len(), 1);

        let deleted = store
            .mark_deleted(request.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(deleted.deleted_at.is_some());
        assert!(store.list_by_passenger(request.passenger_id).await.unwrap().is_empty());
        assert!(store.get(request.id).await.unwrap().is_some());
    }

    #[test]
    fn unreadable_directory_file_is_a_storage_error() {
        let missing = std::env::temp_dir().join(format!("drivers-{}.json", Uuid::new_v4()));
        let result = InMemoryDriverDirectory::from_file(&missing);
        assert!(matches!(result, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn unrated_driver_defaults_to_zero() {
        let directory = InMemoryDriverDirectory::new();
        let driver_id = Uuid::from_u128(5);
        assert_eq!(directory.rating(driver_id).await.unwrap(), DriverRating::default());

        directory.set_rating(
            driver_id,
            DriverRating {
                average: 4.2,
                count: 0,
            },
        );
        assert_eq!(directory.rating(driver_id).await.unwrap().average, 0.0);
    }
}
