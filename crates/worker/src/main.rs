//! `jobwatch-worker` -- headless job-status tracker.
//!
//! Runs one poll coordinator against the publishing backend for a single
//! scope (one content generation or one customer) and logs every
//! completion as it is discovered.
//!
//! # Environment variables
//!
//! See [`TrackerConfig::from_env`] for the full table. The worker requires
//! exactly one of `JOBWATCH_CONTENT_GENERATION_ID` and
//! `JOBWATCH_CUSTOMER_ID`.
//!
//! # Signals
//!
//! | Signal          | Effect                         |
//! |-----------------|--------------------------------|
//! | `SIGUSR1`       | pause polling (view hidden)    |
//! | `SIGUSR2`       | resume polling, check at once  |
//! | `SIGINT`/`SIGTERM` | graceful shutdown           |

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobwatch_client::{BackendApi, BackendClient};
use jobwatch_events::JobEvent;
use jobwatch_tracker::{TrackerConfig, TrackerHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobwatch_worker=info,jobwatch_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = TrackerConfig::from_env().context("Invalid configuration")?;
    let scope = config.scope.context(
        "JOBWATCH_CONTENT_GENERATION_ID or JOBWATCH_CUSTOMER_ID must be set",
    )?;
    tracing::info!(
        api_url = %config.api_url,
        ?scope,
        tick_ms = config.coordinator.tick.as_millis() as u64,
        sweep_secs = config.coordinator.sweep_interval.as_secs(),
        "Loaded tracker configuration",
    );

    // --- Backend client ---
    let client = BackendClient::new(
        config.api_url.clone(),
        config.api_token.clone(),
        config.request_timeout,
    )
    .context("Failed to build HTTP client")?;
    let backend: Arc<dyn BackendApi> = Arc::new(client);

    // --- Tracker ---
    let handle = TrackerHandle::start(backend, config.coordinator, Some(scope));
    let events = tokio::spawn(log_events(handle.subscribe()));

    #[cfg(unix)]
    let visibility = Some(visibility_signals(&handle)?);
    #[cfg(not(unix))]
    let visibility: Option<tokio::task::JoinHandle<()>> = None;

    shutdown_signal().await;

    // --- Shutdown ---
    if let Some(task) = visibility {
        task.abort();
    }
    handle.stop().await.context("Tracker did not stop cleanly")?;
    events.abort();
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Log every notification as a structured line.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                tracing::info!(
                    job = %event.key,
                    event_type = event.event_type,
                    message = %event.message,
                    %payload,
                    "Job event",
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Map `SIGUSR1`/`SIGUSR2` to hiding and showing the view.
#[cfg(unix)]
fn visibility_signals(handle: &TrackerHandle) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hide = signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let mut show = signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;
    let gate = handle.visibility();

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = hide.recv() => {
                    tracing::info!("Received SIGUSR1, pausing polling");
                    gate.set_visible(false);
                }
                Some(()) = show.recv() => {
                    tracing::info!("Received SIGUSR2, resuming polling");
                    gate.set_visible(true);
                }
                else => break,
            }
        }
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
