use serde::{Deserialize, Serialize};

use crate::geo::{haversine_km, round2};
use crate::models::presence::GeoPoint;

pub const DEFAULT_AVG_SPEED_KMH: f64 = 30.0;
const DEFAULT_BASE_FARE: f64 = 15.0;
const DEFAULT_PER_KM: f64 = 3.5;
const DEFAULT_PER_MINUTE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FareSchedule {
    pub base_fare: f64,
    pub per_km: f64,
    pub per_minute: f64,
    pub avg_speed_kmh: f64,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            base_fare: DEFAULT_BASE_FARE,
            per_km: DEFAULT_PER_KM,
            per_minute: DEFAULT_PER_MINUTE,
            avg_speed_kmh: DEFAULT_AVG_SPEED_KMH,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripEstimate {
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub cost: f64,
}

impl FareSchedule {
    pub fn eta_minutes(&self, distance_km: f64) -> u32 {
        eta_minutes(distance_km, self.avg_speed_kmh)
    }

    pub fn estimate_cost(&self, distance_km: f64, duration_minutes: u32) -> f64 {
        round2(
            self.base_fare
                + self.per_km * distance_km.max(0.0)
                + self.per_minute * duration_minutes as f64,
        )
    }

    pub fn estimate_trip(&self, pickup: &GeoPoint, dropoff: &GeoPoint) -> TripEstimate {
        let distance_km = haversine_km(pickup, dropoff);
        let duration_minutes = self.eta_minutes(distance_km);

        TripEstimate {
            distance_km: round2(distance_km),
            duration_minutes,
            cost: self.estimate_cost(distance_km, duration_minutes),
        }
    }
}

/// Whole minutes needed to cover `distance_km`, rounded up.
pub fn eta_minutes(distance_km: f64, avg_speed_kmh: f64) -> u32 {
    if avg_speed_kmh <= 0.0 || !avg_speed_kmh.is_finite() || distance_km <= 0.0 {
        return 0;
    }

    (distance_km / avg_speed_kmh * 60.0).ceil() as u32
}

pub fn estimate_cost(distance_km: f64, duration_minutes: u32) -> f64 {
    FareSchedule::default().estimate_cost(distance_km, duration_minutes)
}

#[cfg(test)]
mod tests {
    use super::{estimate_cost, eta_minutes, FareSchedule, DEFAULT_AVG_SPEED_KMH};
    use crate::models::presence::GeoPoint;

    #[test]
    fn base_fare_for_empty_trip() {
        assert_eq!(estimate_cost(0.0, 0), 15.0);
    }

    #[test]
    fn cost_grows_with_distance_and_duration() {
        assert_eq!(estimate_cost(10.0, 20), 60.0);
        assert!(estimate_cost(10.0, 20) <= estimate_cost(10.5, 20));
        assert!(estimate_cost(10.0, 20) <= estimate_cost(10.0, 21));
    }

    #[test]
    fn eta_rounds_up_to_whole_minutes() {
        assert_eq!(eta_minutes(0.0, DEFAULT_AVG_SPEED_KMH), 0);
        assert_eq!(eta_minutes(0.1, DEFAULT_AVG_SPEED_KMH), 1);
        assert_eq!(eta_minutes(5.0, DEFAULT_AVG_SPEED_KMH), 10);
        assert_eq!(eta_minutes(5.01, DEFAULT_AVG_SPEED_KMH), 11);
    }

    #[test]
    fn eta_is_monotonic_and_halves_with_double_speed() {
        let mut previous = 0;
        for step in 0..100 {
            let eta = eta_minutes(step as f64 * 0.37, 30.0);
            assert!(eta >= previous);
            previous = eta;
        }

        assert_eq!(eta_minutes(30.0, 30.0), 60);
        assert_eq!(eta_minutes(30.0, 60.0), 30);
    }

    #[test]
    fn non_positive_speed_yields_zero() {
        assert_eq!(eta_minutes(10.0, 0.0), 0);
        assert_eq!(eta_minutes(10.0, -5.0), 0);
    }

    #[test]
    fn trip_estimate_bundles_all_three() {
        let schedule = FareSchedule::default();
        let estimate = schedule.estimate_trip(
            &GeoPoint { lat: 41.0, lng: 29.0 },
            &GeoPoint { lat: 41.1, lng: 29.1 },
        );

        assert_eq!(estimate.distance_km, 13.93);
        assert_eq!(estimate.duration_minutes, 28);
        assert!(estimate.cost > 15.0);
    }
}
