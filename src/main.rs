use std::sync::Arc;

use taxi_dispatch::store::memory::InMemoryDriverDirectory;
use taxi_dispatch::{api, config, engine, error, state};
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let directory = match &config.driver_directory_path {
        Some(path) => {
            let directory = InMemoryDriverDirectory::from_file(path)?;
            tracing::info!(
                path = %path.display(),
                drivers = directory.len(),
                "driver directory loaded"
            );
            directory
        }
        None => {
            tracing::warn!("DRIVER_DIRECTORY_PATH not set; nearby searches will find no drivers");
            InMemoryDriverDirectory::new()
        }
    };

    let shared_state = Arc::new(state::AppState::new(&config, Arc::new(directory)));

    if config.expiry_sweep_interval_secs > 0 {
        tokio::spawn(engine::expiry::run_expiry_sweeper(
            shared_state.clone(),
            Duration::from_secs(config.expiry_sweep_interval_secs),
        ));
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
