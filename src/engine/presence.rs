use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::presence::{DriverPresence, GeoPoint, LocationUpdate};
use crate::store::{PresenceStore, Reservation};

pub const DEFAULT_STALENESS_MINUTES: i64 = 30;

/// Tracks where each driver last reported from and whether they take rides.
#[derive(Clone)]
pub struct PresenceRegistry {
    store: Arc<dyn PresenceStore>,
    staleness: Duration,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn PresenceStore>, staleness: Duration) -> Self {
        Self { store, staleness }
    }

    pub async fn update_location(&self, update: LocationUpdate) -> Result<DriverPresence, AppError> {
        let location = update.location.validated()?;
        let previous = self.store.get(update.driver_id).await?;

        let presence =
            LocationUpdate { location, ..update }.into_presence(previous.as_ref(), Utc::now());
        self.store.upsert(presence.clone()).await?;

        debug!(
            driver_id = %presence.driver_id,
            lat = presence.location.lat,
            lng = presence.location.lng,
            available = presence.available,
            "driver location updated"
        );

        Ok(presence)
    }

    /// Returns `None` for a driver that has never sent a location.
    pub async fn set_availability(
        &self,
        driver_id: Uuid,
        available: bool,
    ) -> Result<Option<DriverPresence>, AppError> {
        let presence = self.store.set_available(driver_id, available).await?;
        if presence.is_some() {
            info!(driver_id = %driver_id, available, "driver availability changed");
        }
        Ok(presence)
    }

    pub async fn go_offline(&self, driver_id: Uuid) -> Result<Option<DriverPresence>, AppError> {
        let presence = self.store.set_online(driver_id, false).await?;
        if presence.is_some() {
            info!(driver_id = %driver_id, "driver went offline");
        }
        Ok(presence)
    }

    /// Takes a driver out of the matchable pool if, and only if, they are in it.
    pub async fn reserve(&self, driver_id: Uuid) -> Result<Reservation, AppError> {
        let fresh_since = Utc::now() - self.staleness;
        let reservation = self.store.reserve(driver_id, fresh_since).await?;
        if let Reservation::Reserved(_) = reservation {
            debug!(driver_id = %driver_id, "driver reserved");
        }
        Ok(reservation)
    }

    pub async fn get_location(&self, driver_id: Uuid) -> Result<Option<DriverPresence>, AppError> {
        self.store.get(driver_id).await
    }

    pub async fn list_online_available(&self) -> Result<Vec<DriverPresence>, AppError> {
        let fresh_since = Utc::now() - self.staleness;
        self.store.list_online_available(fresh_since).await
    }

    /// Matchable drivers within `radius_km` of `center`, nearest first.
    pub async fn list_available_within(
        &self,
        center: GeoPoint,
        radius_km: f64,
        limit: Option<usize>,
    ) -> Result<Vec<DriverPresence>, AppError> {
        let fresh_since = Utc::now() - self.staleness;
        self.store
            .list_available_within(fresh_since, center, radius_km, limit)
            .await
    }

    pub async fn count_online_available(&self) -> Result<usize, AppError> {
        Ok(self.list_online_available().await?.len())
    }

    pub async fn is_available(&self, driver_id: Uuid) -> Result<bool, AppError> {
        let now = Utc::now();
        Ok(self
            .store
            .get(driver_id)
            .await?
            .is_some_and(|presence| presence.is_matchable(now, self.staleness)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::PresenceRegistry;
    use crate::models::presence::{DriverPresence, GeoPoint, LocationUpdate};
    use crate::store::memory::InMemoryPresenceStore;
    use crate::store::{PresenceStore, Reservation};

    fn registry() -> (PresenceRegistry, Arc<InMemoryPresenceStore>) {
        let store = Arc::new(InMemoryPresenceStore::new());
        (
            PresenceRegistry::new(store.clone(), Duration::minutes(30)),
            store,
        )
    }

    fn ping(driver_id: Uuid, lat: f64, lng: f64, available: bool) -> LocationUpdate {
        LocationUpdate {
            driver_id,
            location: GeoPoint { lat, lng },
            available,
            address: None,
            speed: None,
            heading: None,
        }
    }

    #[tokio::test]
    async fn first_ping_creates_online_record() {
        let (registry, _) = registry();
        let driver_id = Uuid::from_u128(1);

        assert!(registry.get_location(driver_id).await.unwrap().is_none());
        registry
            .update_location(ping(driver_id, 41.0, 29.0, true))
            .await
            .unwrap();

        let presence = registry.get_location(driver_id).await.unwrap().unwrap();
        assert!(presence.online);
        assert!(presence.available);
        assert!(registry.is_available(driver_id).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_coordinates_are_not_stored() {
        let (registry, _) = registry();
        let driver_id = Uuid::from_u128(2);

        let result = registry
            .update_location(ping(driver_id, 123.0, 29.0, true))
            .await;
        assert!(result.is_err());
        assert!(registry.get_location(driver_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_availability_is_idempotent() {
        let (registry, _) = registry();
        let driver_id = Uuid::from_u128(3);
        registry
            .update_location(ping(driver_id, 41.0, 29.0, false))
            .await
            .unwrap();

        let once = registry
            .set_availability(driver_id, true)
            .await
            .unwrap()
            .unwrap();
        let twice = registry
            .set_availability(driver_id, true)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(once, twice);
        assert_eq!(once.last_update_time, twice.last_update_time);
    }

    #[tokio::test]
    async fn set_availability_for_unknown_driver_is_a_no_op() {
        let (registry, _) = registry();
        let outcome = registry
            .set_availability(Uuid::from_u128(4), true)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn reserve_only_takes_matchable_drivers() {
        let (registry, _) = registry();
        let driver_id = Uuid::from_u128(5);
        registry
            .update_location(ping(driver_id, 41.0, 29.0, true))
            .await
            .unwrap();

        assert!(matches!(
            registry.reserve(driver_id).await.unwrap(),
            Reservation::Reserved(ref presence) if !presence.available
        ));
        assert!(matches!(
            registry.reserve(driver_id).await.unwrap(),
            Reservation::Unavailable(_)
        ));

        registry.set_availability(driver_id, true).await.unwrap();
        registry.go_offline(driver_id).await.unwrap();
        assert!(matches!(
            registry.reserve(driver_id).await.unwrap(),
            Reservation::Unavailable(_)
        ));
        assert!(matches!(
            registry.reserve(Uuid::from_u128(6)).await.unwrap(),
            Reservation::Missing
        ));
    }

    #[tokio::test]
    async fn stale_and_offline_drivers_are_not_listed() {
        let (registry, store) = registry();
        let fresh = Uuid::from_u128(10);
        let stale = Uuid::from_u128(11);
        let offline = Uuid::from_u128(12);
        let busy = Uuid::from_u128(13);

        registry.update_location(ping(fresh, 41.0, 29.0, true)).await.unwrap();
        registry.update_location(ping(offline, 41.0, 29.0, true)).await.unwrap();
        registry.go_offline(offline).await.unwrap();
        registry.update_location(ping(busy, 41.0, 29.0, false)).await.unwrap();
        store
            .upsert(DriverPresence {
                driver_id: stale,
                location: GeoPoint { lat: 41.0, lng: 29.0 },
                address: None,
                available: true,
                online: true,
                last_update_time: Utc::now() - Duration::minutes(31),
                speed: None,
                heading: None,
            })
            .await
            .unwrap();

        let listed: Vec<Uuid> = registry
            .list_online_available()
            .await
            .unwrap()
            .into_iter()
            .map(|presence| presence.driver_id)
            .collect();

        assert_eq!(listed, vec![fresh]);
        assert!(!registry.is_available(stale).await.unwrap());
        assert!(!registry.is_available(offline).await.unwrap());
        assert!(!registry.is_available(busy).await.unwrap());
        assert_eq!(registry.count_online_available().await.unwrap(), 1);
    }
}
