use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::estimate::FareSchedule;
use crate::engine::presence::PresenceRegistry;
use crate::error::AppError;
use crate::geo::{haversine_km, round2};
use crate::models::driver::Candidate;
use crate::models::presence::GeoPoint;
use crate::store::DriverDirectory;

pub const DEFAULT_RADIUS_KM: f64 = 5.0;
pub const DEFAULT_MAX_RESULTS: usize = 10;
const MIN_RADIUS_KM: f64 = 0.1;
const MAX_RADIUS_KM: f64 = 50.0;
const MAX_RESULTS_LIMIT: usize = 100;
const MAX_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
pub struct NearbyQuery {
    pub pickup: GeoPoint,
    pub radius_km: f64,
    pub max_results: usize,
    pub min_rating: Option<f64>,
}

impl NearbyQuery {
    pub fn new(pickup: GeoPoint) -> Self {
        Self {
            pickup,
            radius_km: DEFAULT_RADIUS_KM,
            max_results: DEFAULT_MAX_RESULTS,
            min_rating: None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.pickup.validated()?;

        if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&self.radius_km) {
            return Err(AppError::Validation(format!(
                "radius must be within [{MIN_RADIUS_KM}, {MAX_RADIUS_KM}] km, got {}",
                self.radius_km
            )));
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(AppError::Validation(format!(
                "maxResults must be within [1, {MAX_RESULTS_LIMIT}], got {}",
                self.max_results
            )));
        }
        if let Some(min_rating) = self.min_rating {
            if !(0.0..=MAX_RATING).contains(&min_rating) {
                return Err(AppError::Validation(format!(
                    "minRating must be within [0, {MAX_RATING}], got {min_rating}"
                )));
            }
        }

        Ok(())
    }
}

/// Geospatial search over the drivers that are currently able to take a ride.
#[derive(Clone)]
pub struct CandidateFinder {
    presence: PresenceRegistry,
    directory: Arc<dyn DriverDirectory>,
    fares: FareSchedule,
    prefetch_limit: Option<usize>,
}

impl CandidateFinder {
    pub fn new(
        presence: PresenceRegistry,
        directory: Arc<dyn DriverDirectory>,
        fares: FareSchedule,
        prefetch_limit: Option<usize>,
    ) -> Self {
        Self {
            presence,
            directory,
            fares,
            prefetch_limit,
        }
    }

    pub async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<Candidate>, AppError> {
        query.validate()?;

        // The rating filter runs after the store, so a capped pool could lose
        // qualifying drivers behind closer low-rated ones.
        let limit = match query.min_rating {
            Some(_) => None,
            None => self
                .prefetch_limit
                .map(|limit| limit.max(query.max_results)),
        };

        let in_radius: Vec<_> = self
            .presence
            .list_available_within(query.pickup, query.radius_km, limit)
            .await?
            .into_iter()
            .map(|presence| {
                let distance_km = haversine_km(&query.pickup, &presence.location);
                (presence, distance_km)
            })
            .collect();

        let mut ranked = Vec::with_capacity(in_radius.len());
        for (presence, distance_km) in in_radius {
            let rating = self.directory.rating(presence.driver_id).await?;

            let below_threshold = query
                .min_rating
                .is_some_and(|min_rating| rating.average < min_rating);
            if below_threshold {
                continue;
            }

            let Some(profile) = self.directory.profile(presence.driver_id).await? else {
                warn!(driver_id = %presence.driver_id, "skipping driver without profile");
                continue;
            };

            ranked.push((distance_km, profile, rating, presence.location));
        }

        ranked.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        ranked.truncate(query.max_results);

        let candidates: Vec<Candidate> = ranked
            .into_iter()
            .map(|(distance_km, driver, rating, location)| Candidate {
                driver,
                distance_km: round2(distance_km),
                average_rating: round2(rating.average),
                rating_count: rating.count,
                estimated_arrival_minutes: self.fares.eta_minutes(distance_km),
                location,
            })
            .collect();

        debug!(
            lat = query.pickup.lat,
            lng = query.pickup.lng,
            radius_km = query.radius_km,
            found = candidates.len(),
            "nearby driver search"
        );

        Ok(candidates)
    }
}
