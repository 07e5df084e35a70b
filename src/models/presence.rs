use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(format!(
                "latitude must be within [-90, 90], got {lat}"
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::Validation(format!(
                "longitude must be within [-180, 180], got {lng}"
            )));
        }

        Ok(Self { lat, lng })
    }

    pub fn validated(self) -> Result<Self, AppError> {
        Self::new(self.lat, self.lng)
    }
}

/// Last reported position and availability of a driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverPresence {
    pub driver_id: Uuid,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub available: bool,
    pub online: bool,
    pub last_update_time: DateTime<Utc>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl DriverPresence {
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.last_update_time <= window
    }

    /// Online, available and reported within `window`.
    pub fn is_matchable(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.online && self.available && self.is_fresh(now, window)
    }
}

/// A location ping as reported by the driver app.
#[derive(Debug, Clone)]
pub struct LocationUpdate {
    pub driver_id: Uuid,
    pub location: GeoPoint,
    pub available: bool,
    pub address: Option<String>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl LocationUpdate {
    /// Merges the ping over `previous`; omitted optional fields keep their old value.
    pub fn into_presence(self, previous: Option<&DriverPresence>, now: DateTime<Utc>) -> DriverPresence {
        DriverPresence {
            driver_id: self.driver_id,
            location: self.location,
            address: self
                .address
                .or_else(|| previous.and_then(|p| p.address.clone())),
            available: self.available,
            online: true,
            last_update_time: now,
            speed: self.speed.or_else(|| previous.and_then(|p| p.speed)),
            heading: self.heading.or_else(|| previous.and_then(|p| p.heading)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{DriverPresence, GeoPoint, LocationUpdate};

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn presence_ages_out_after_window() {
        let now = Utc::now();
        let presence = DriverPresence {
            driver_id: Uuid::from_u128(1),
            location: GeoPoint { lat: 41.0, lng: 29.0 },
            address: None,
            available: true,
            online: true,
            last_update_time: now - Duration::minutes(31),
            speed: None,
            heading: None,
        };

        assert!(!presence.is_matchable(now, Duration::minutes(30)));
        assert!(presence.is_matchable(now, Duration::minutes(45)));
    }

    #[test]
    fn ping_keeps_previous_optional_fields() {
        let now = Utc::now();
        let first = LocationUpdate {
            driver_id: Uuid::from_u128(7),
            location: GeoPoint { lat: 41.0, lng: 29.0 },
            available: true,
            address: Some("Taksim".to_string()),
            speed: Some(32.0),
            heading: Some(90.0),
        }
        .into_presence(None, now);

        let second = LocationUpdate {
            driver_id: Uuid::from_u128(7),
            location: GeoPoint { lat: 41.01, lng: 29.01 },
            available: false,
            address: None,
            speed: None,
            heading: Some(180.0),
        }
        .into_presence(Some(&first), now);

        assert_eq!(second.address.as_deref(), Some("Taksim"));
        assert_eq!(second.speed, Some(32.0));
        assert_eq!(second.heading, Some(180.0));
        assert!(!second.available);
        assert!(second.online);
    }
}
