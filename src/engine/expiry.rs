use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::state::AppState;

/// Periodically moves overdue Pending requests to Expired. Readers already see
/// them as expired before this runs; the sweep only makes the stored status agree.
pub async fn run_expiry_sweeper(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "expiry sweeper started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match state.matching.expire_due().await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "expired overdue ride requests"),
            Err(err) => error!(error = %err, "expiry sweep failed"),
        }
    }
}
