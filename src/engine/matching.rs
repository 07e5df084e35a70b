use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::estimate::{FareSchedule, TripEstimate};
use crate::engine::finder::{CandidateFinder, DEFAULT_RADIUS_KM, NearbyQuery};
use crate::engine::presence::PresenceRegistry;
use crate::error::AppError;
use crate::models::driver::Candidate;
use crate::models::presence::GeoPoint;
use crate::models::request::{
    RequestEvent, RequestStatus, RideConstraints, RideRequest, StatusChange,
};
use crate::observability::metrics::Metrics;
use crate::store::{RequestStore, Reservation, Transition};

pub const DEFAULT_MAX_WAIT_MINUTES: u32 = 15;
const BEST_MATCH_POOL: usize = 5;
const MAX_WAIT_LIMIT_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy)]
pub struct MatchingSettings {
    pub default_max_wait_minutes: u32,
    pub default_radius_km: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_max_wait_minutes: DEFAULT_MAX_WAIT_MINUTES,
            default_radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

/// A passenger's ride request before it is priced and stored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestInput {
    pub passenger_id: Uuid,
    pub pickup: GeoPoint,
    #[serde(default)]
    pub pickup_address: Option<String>,
    pub dropoff: GeoPoint,
    #[serde(default)]
    pub dropoff_address: Option<String>,
    #[serde(default)]
    pub max_wait_time_minutes: Option<u32>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub status: RequestStatus,
    pub request_id: Option<Uuid>,
    pub candidate: Option<Candidate>,
    pub estimate: TripEstimate,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub request: RideRequest,
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRequestStats {
    pub pending: usize,
    pub accepted: usize,
    pub total: usize,
}

#[derive(Clone, Copy)]
enum DriverAction {
    Accept,
    Reject,
}

impl DriverAction {
    fn target(self) -> RequestStatus {
        match self {
            DriverAction::Accept => RequestStatus::Accepted,
            DriverAction::Reject => RequestStatus::Rejected,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            DriverAction::Accept => "accept",
            DriverAction::Reject => "reject",
        }
    }
}

/// Owns the ride request lifecycle. Every status write goes through
/// [`RequestStore::transition`], so concurrent callers race on the store's
/// compare-and-set rather than on anything held here.
#[derive(Clone)]
pub struct MatchingOrchestrator {
    requests: Arc<dyn RequestStore>,
    presence: PresenceRegistry,
    finder: CandidateFinder,
    fares: FareSchedule,
    settings: MatchingSettings,
    metrics: Metrics,
    events_tx: broadcast::Sender<RequestEvent>,
}

impl MatchingOrchestrator {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        presence: PresenceRegistry,
        finder: CandidateFinder,
        fares: FareSchedule,
        settings: MatchingSettings,
        metrics: Metrics,
        events_tx: broadcast::Sender<RequestEvent>,
    ) -> Self {
        Self {
            requests,
            presence,
            finder,
            fares,
            settings,
            metrics,
            events_tx,
        }
    }

    pub async fn find_best_match(&self, input: RideRequestInput) -> Result<MatchOutcome, AppError> {
        let start = Instant::now();
        let constraints = self.constraints_for(&input)?;
        let estimate = self.fares.estimate_trip(&input.pickup, &input.dropoff);

        let query = NearbyQuery {
            pickup: input.pickup,
            radius_km: constraints.max_distance_km,
            max_results: BEST_MATCH_POOL,
            min_rating: constraints.min_rating,
        };
        let candidates = match self.finder.find_nearby(&query).await {
            Ok(candidates) => candidates,
            Err(err) => {
                self.metrics.observe_match("error", start.elapsed().as_secs_f64());
                return Err(err);
            }
        };

        let Some(nearest) = candidates.into_iter().next() else {
            self.metrics
                .observe_match("no_driver", start.elapsed().as_secs_f64());
            info!(passenger_id = %input.passenger_id, "no driver found near pickup");
            return Ok(MatchOutcome {
                status: RequestStatus::Rejected,
                request_id: None,
                candidate: None,
                estimate,
                message: "No available driver found nearby".to_string(),
            });
        };

        let request = self.build_request(input, constraints, estimate, Utc::now());
        self.requests.insert(request.clone()).await?;
        self.publish(&request);
        self.metrics
            .observe_match("proposed", start.elapsed().as_secs_f64());

        info!(
            request_id = %request.id,
            passenger_id = %request.passenger_id,
            proposed_driver_id = %nearest.driver.id,
            distance_km = nearest.distance_km,
            "ride request created with proposed driver"
        );

        Ok(MatchOutcome {
            status: RequestStatus::Pending,
            request_id: Some(request.id),
            candidate: Some(nearest),
            estimate,
            message: "Driver found; waiting for acceptance".to_string(),
        })
    }

    pub async fn create_request(&self, input: RideRequestInput) -> Result<RideRequest, AppError> {
        let constraints = self.constraints_for(&input)?;
        let estimate = self.fares.estimate_trip(&input.pickup, &input.dropoff);

        let request = self.build_request(input, constraints, estimate, Utc::now());
        self.requests.insert(request.clone()).await?;
        self.publish(&request);

        info!(
            request_id = %request.id,
            passenger_id = %request.passenger_id,
            estimated_cost = request.estimated_cost,
            "ride request created"
        );

        Ok(request)
    }

    /// The driver is reserved before the status write, so a cancel that
    /// lands after the accept always releases them last.
    pub async fn accept(&self, driver_id: Uuid, request_id: Uuid) -> Result<RideRequest, AppError> {
        let action = DriverAction::Accept;
        let current = self.actionable(action, driver_id, request_id).await?;

        match self.presence.reserve(driver_id).await? {
            Reservation::Reserved(_) => {}
            Reservation::Unavailable(presence) => {
                self.metrics.record_conflict(action.verb());
                warn!(
                    driver_id = %driver_id,
                    request_id = %request_id,
                    online = presence.online,
                    available = presence.available,
                    "driver cannot accept while unavailable"
                );
                return Err(AppError::conflict(
                    format!("driver {driver_id} is not available to accept rides"),
                    current,
                ));
            }
            Reservation::Missing => {
                return Err(AppError::NotFound(format!("driver {driver_id} not found")));
            }
        }

        let result = self.apply_driver_action(action, driver_id, request_id).await;
        if result.is_err() {
            self.release(driver_id).await;
        }
        result
    }

    pub async fn reject(&self, driver_id: Uuid, request_id: Uuid) -> Result<RideRequest, AppError> {
        let action = DriverAction::Reject;
        self.actionable(action, driver_id, request_id).await?;
        self.apply_driver_action(action, driver_id, request_id).await
    }

    pub async fn cancel(&self, request_id: Uuid) -> Result<RideRequest, AppError> {
        let current = self.load(request_id).await?;
        if current.is_overdue(Utc::now()) {
            let expired = self.expire(current).await?;
            return Err(self.conflict("cancel", expired));
        }

        let change = StatusChange {
            to: RequestStatus::Cancelled,
            driver_id: None,
            at: Utc::now(),
        };
        let cancelled = self
            .apply(
                "cancel",
                request_id,
                &[RequestStatus::Pending, RequestStatus::Accepted],
                change,
            )
            .await?;

        if let (Some(driver_id), Some(_)) = (cancelled.driver_id, cancelled.accepted_time) {
            self.release(driver_id).await;
        }

        Ok(cancelled)
    }

    /// Reads a request, persisting `Expired` first if its deadline has passed.
    pub async fn get_status(&self, request_id: Uuid) -> Result<RequestSnapshot, AppError> {
        let mut request = self.load(request_id).await?;
        if request.is_overdue(Utc::now()) {
            request = self.expire(request).await?;
        }

        Ok(RequestSnapshot {
            message: request.status.message(),
            request,
        })
    }

    pub async fn passenger_history(&self, passenger_id: Uuid) -> Result<Vec<RideRequest>, AppError> {
        let now = Utc::now();
        Ok(self
            .requests
            .list_by_passenger(passenger_id)
            .await?
            .into_iter()
            .map(|request| request.observed_at(now))
            .collect())
    }

    pub async fn driver_history(&self, driver_id: Uuid) -> Result<Vec<RideRequest>, AppError> {
        let now = Utc::now();
        Ok(self
            .requests
            .list_by_driver(driver_id)
            .await?
            .into_iter()
            .map(|request| request.observed_at(now))
            .collect())
    }

    /// Soft-deletes a request that has reached a terminal state.
    pub async fn archive(&self, request_id: Uuid) -> Result<RideRequest, AppError> {
        let request = self.load(request_id).await?;
        let now = Utc::now();

        if !request.effective_status(now).is_terminal() {
            return Err(self.conflict("archive", request));
        }

        self.requests
            .mark_deleted(request_id, now)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))
    }

    pub async fn active_requests(&self) -> Result<ActiveRequestStats, AppError> {
        let now = Utc::now();
        let pending = self
            .requests
            .list_by_status(RequestStatus::Pending)
            .await?
            .iter()
            .filter(|request| !request.is_overdue(now))
            .count();
        let accepted = self
            .requests
            .list_by_status(RequestStatus::Accepted)
            .await?
            .len();

        Ok(ActiveRequestStats {
            pending,
            accepted,
            total: pending + accepted,
        })
    }

    pub async fn available_drivers(&self) -> Result<usize, AppError> {
        self.presence.count_online_available().await
    }

    /// Moves every overdue Pending request to Expired. Returns how many moved.
    pub async fn expire_due(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let overdue: Vec<RideRequest> = self
            .requests
            .list_by_status(RequestStatus::Pending)
            .await?
            .into_iter()
            .filter(|request| request.is_overdue(now))
            .collect();

        let mut expired = 0;
        for request in overdue {
            if self.expire(request).await?.status == RequestStatus::Expired {
                expired += 1;
            }
        }

        Ok(expired)
    }

    /// Checks that the driver is known and the request has not run out of time.
    async fn actionable(
        &self,
        action: DriverAction,
        driver_id: Uuid,
        request_id: Uuid,
    ) -> Result<RideRequest, AppError> {
        if self.presence.get_location(driver_id).await?.is_none() {
            return Err(AppError::NotFound(format!("driver {driver_id} not found")));
        }

        let current = self.load(request_id).await?;
        if current.is_overdue(Utc::now()) {
            let expired = self.expire(current).await?;
            return Err(self.conflict(action.verb(), expired));
        }

        Ok(current)
    }

    async fn apply_driver_action(
        &self,
        action: DriverAction,
        driver_id: Uuid,
        request_id: Uuid,
    ) -> Result<RideRequest, AppError> {
        let change = StatusChange {
            to: action.target(),
            driver_id: Some(driver_id),
            at: Utc::now(),
        };
        self.apply(action.verb(), request_id, &[RequestStatus::Pending], change)
            .await
    }

    /// Puts a driver back in the pool. The request outcome is already
    /// settled at this point, so a failed write is logged, not returned.
    async fn release(&self, driver_id: Uuid) {
        if let Err(err) = self.presence.set_availability(driver_id, true).await {
            warn!(driver_id = %driver_id, error = %err, "failed to release driver");
        }
    }

    async fn apply(
        &self,
        operation: &'static str,
        request_id: Uuid,
        from: &[RequestStatus],
        change: StatusChange,
    ) -> Result<RideRequest, AppError> {
        match self.requests.transition(request_id, from, change).await? {
            Transition::Applied(request) => {
                self.metrics.record_transition(request.status.as_str());
                self.publish(&request);
                info!(
                    request_id = %request.id,
                    status = request.status.as_str(),
                    driver_id = ?request.driver_id,
                    "ride request {operation}"
                );
                Ok(request)
            }
            Transition::Rejected(current) => Err(self.conflict(operation, current)),
            Transition::Missing => Err(AppError::NotFound(format!(
                "request {request_id} not found"
            ))),
        }
    }

    /// Returns the record as it stands after the attempt, whoever won.
    async fn expire(&self, request: RideRequest) -> Result<RideRequest, AppError> {
        let change = StatusChange {
            to: RequestStatus::Expired,
            driver_id: None,
            at: Utc::now(),
        };
        match self
            .requests
            .transition(request.id, &[RequestStatus::Pending], change)
            .await?
        {
            Transition::Applied(expired) => {
                self.metrics.record_transition(expired.status.as_str());
                self.publish(&expired);
                info!(request_id = %expired.id, "ride request expired");
                Ok(expired)
            }
            Transition::Rejected(current) => Ok(current),
            Transition::Missing => Err(AppError::NotFound(format!(
                "request {} not found",
                request.id
            ))),
        }
    }

    async fn load(&self, request_id: Uuid) -> Result<RideRequest, AppError> {
        self.requests
            .get(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))
    }

    fn conflict(&self, operation: &'static str, current: RideRequest) -> AppError {
        self.metrics.record_conflict(operation);
        warn!(
            request_id = %current.id,
            status = current.status.as_str(),
            operation,
            "ride request transition refused"
        );
        AppError::conflict(
            format!(
                "cannot {operation} request {}: it is {}",
                current.id,
                current.status.as_str()
            ),
            current,
        )
    }

    fn constraints_for(&self, input: &RideRequestInput) -> Result<RideConstraints, AppError> {
        input.pickup.validated()?;
        input.dropoff.validated()?;

        let max_wait_time_minutes = input
            .max_wait_time_minutes
            .unwrap_or(self.settings.default_max_wait_minutes);
        if !(1..=MAX_WAIT_LIMIT_MINUTES).contains(&max_wait_time_minutes) {
            return Err(AppError::Validation(format!(
                "maxWaitTimeMinutes must be within [1, {MAX_WAIT_LIMIT_MINUTES}], got {max_wait_time_minutes}"
            )));
        }

        let constraints = RideConstraints {
            max_wait_time_minutes,
            min_rating: input.min_rating,
            max_distance_km: input
                .max_distance_km
                .unwrap_or(self.settings.default_radius_km),
        };

        NearbyQuery {
            pickup: input.pickup,
            radius_km: constraints.max_distance_km,
            max_results: BEST_MATCH_POOL,
            min_rating: constraints.min_rating,
        }
        .validate()?;

        Ok(constraints)
    }

    fn build_request(
        &self,
        input: RideRequestInput,
        constraints: RideConstraints,
        estimate: TripEstimate,
        now: DateTime<Utc>,
    ) -> RideRequest {
        RideRequest {
            id: Uuid::new_v4(),
            passenger_id: input.passenger_id,
            driver_id: None,
            pickup: input.pickup,
            pickup_address: input.pickup_address,
            dropoff: input.dropoff,
            dropoff_address: input.dropoff_address,
            estimated_cost: estimate.cost,
            estimated_distance_km: estimate.distance_km,
            estimated_duration_minutes: estimate.duration_minutes,
            status: RequestStatus::Pending,
            request_time: now,
            accepted_time: None,
            expiry_time: now + Duration::minutes(i64::from(constraints.max_wait_time_minutes)),
            constraints,
            notes: input.notes,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn publish(&self, request: &RideRequest) {
        let _ = self.events_tx.send(RequestEvent::from(request));
    }
}
