use crate::models::presence::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    distance_km(a.lat, a.lng, b.lat, b.lng)
}

pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + phi1.cos() * phi2.cos() * sin_lng * sin_lng;
    // Clamp guards asin against rounding just above 1.0 for antipodal points.
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{distance_km, haversine_km, round2};
    use crate::models::presence::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 41.0082,
            lng: 28.9784,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let there = distance_km(41.0, 29.0, 41.1, 29.1);
        let back = distance_km(41.1, 29.1, 41.0, 29.0);
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn istanbul_tenth_degree_step_is_around_14_km() {
        let distance = distance_km(41.0, 29.0, 41.1, 29.1);
        assert!((distance - 13.93).abs() < 0.05, "got {distance}");
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(13.4567), 13.46);
        assert_eq!(round2(0.004), 0.0);
    }
}
