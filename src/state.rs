use std::sync::Arc;

use chrono::Duration;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::estimate::FareSchedule;
use crate::engine::finder::CandidateFinder;
use crate::engine::matching::MatchingOrchestrator;
use crate::engine::presence::PresenceRegistry;
use crate::models::request::RequestEvent;
use crate::observability::metrics::Metrics;
use crate::store::memory::{InMemoryDriverDirectory, InMemoryPresenceStore, InMemoryRequestStore};
use crate::store::{DriverDirectory, PresenceStore, RequestStore};

pub struct AppState {
    pub presence: PresenceRegistry,
    pub finder: CandidateFinder,
    pub matching: MatchingOrchestrator,
    pub fares: FareSchedule,
    pub events_tx: broadcast::Sender<RequestEvent>,
    pub metrics: Metrics,
}

impl AppState {
    /// Wires the engine over in-memory stores.
    pub fn new(config: &Config, directory: Arc<dyn DriverDirectory>) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryPresenceStore::new()),
            Arc::new(InMemoryRequestStore::new()),
            directory,
        )
    }

    pub fn in_memory(config: &Config) -> (Self, Arc<InMemoryDriverDirectory>) {
        let directory = Arc::new(InMemoryDriverDirectory::new());
        (Self::new(config, directory.clone()), directory)
    }

    pub fn with_stores(
        config: &Config,
        presence_store: Arc<dyn PresenceStore>,
        request_store: Arc<dyn RequestStore>,
        directory: Arc<dyn DriverDirectory>,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();

        let presence = PresenceRegistry::new(
            presence_store,
            Duration::minutes(config.presence_staleness_minutes),
        );
        let finder = CandidateFinder::new(
            presence.clone(),
            directory,
            config.fares,
            config.prefetch_limit(),
        );
        let matching = MatchingOrchestrator::new(
            request_store,
            presence.clone(),
            finder.clone(),
            config.fares,
            config.matching,
            metrics.clone(),
            events_tx.clone(),
        );

        Self {
            presence,
            finder,
            matching,
            fares: config.fares,
            events_tx,
            metrics,
        }
    }
}
