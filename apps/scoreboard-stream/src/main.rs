//! Scoreboard Relay Binary
//!
//! Serves the viewer-facing WebSocket route and bridges every viewer to its
//! own connection to the snapshot source.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin scoreboard-relay
//! ```
//!
//! # Environment Variables
//!
//! - `SCOREBOARD_RELAY_PORT`: Relay listen port (default: 3000)
//! - `SCOREBOARD_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `SCOREBOARD_UPSTREAM_HOST`: Snapshot source host (default: localhost)
//! - `SCOREBOARD_UPSTREAM_PORT`: Snapshot source port (default: 9002)
//! - `SCOREBOARD_UPSTREAM_CONNECT_TIMEOUT_MS`: Upstream open timeout (default: 5000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: scoreboard-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use scoreboard_stream::infrastructure::health::{HealthServer, HealthServerState};
use scoreboard_stream::infrastructure::relay::{
    ConnectionRelay, RelayRegistry, RelayServer, TeardownReason,
};
use scoreboard_stream::infrastructure::telemetry::{self, RELAY_SERVICE_NAME};
use scoreboard_stream::{ScoreboardConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time given to pairs to send their close frames after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init(RELAY_SERVICE_NAME);

    tracing::info!("Starting Scoreboard Relay");

    let _metrics_handle = init_metrics();

    let config = ScoreboardConfig::from_env()?;
    let settings = config.relay;
    tracing::info!(
        relay_port = settings.relay_port,
        health_port = settings.health_port,
        upstream = %settings.upstream_url(),
        connect_timeout_ms = settings.upstream_connect_timeout.as_millis(),
        "Configuration loaded"
    );

    let shutdown_token = CancellationToken::new();
    let registry = Arc::new(RelayRegistry::new());

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        settings.upstream_url(),
        Arc::clone(&registry),
    ));
    let health_server = HealthServer::new(
        settings.health_port,
        health_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let relay_port = settings.relay_port;
    let relay = Arc::new(ConnectionRelay::new(
        settings,
        Arc::clone(&registry),
        shutdown_token.clone(),
    ));
    let relay_server = RelayServer::new(relay_port, relay, shutdown_token.clone());
    let relay_task = tokio::spawn(async move {
        if let Err(e) = relay_server.run().await {
            tracing::error!(error = %e, "Relay server error");
        }
    });

    tracing::info!("Scoreboard relay ready");

    await_shutdown(shutdown_token).await;

    drain_pairs(&registry).await;
    if tokio::time::timeout(SHUTDOWN_GRACE, relay_task).await.is_err() {
        tracing::warn!("Relay server did not stop in time");
    }

    tracing::info!("Scoreboard relay stopped");
    Ok(())
}

/// Wait for running pairs to close their legs, then drop any stragglers.
async fn drain_pairs(registry: &RelayRegistry) {
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while registry.active() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let forced = registry.teardown_all(TeardownReason::Shutdown);
    if forced > 0 {
        tracing::warn!(forced, "Pairs still registered after shutdown grace");
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        grace_secs = SHUTDOWN_GRACE.as_secs(),
        "Graceful shutdown started"
    );
}
