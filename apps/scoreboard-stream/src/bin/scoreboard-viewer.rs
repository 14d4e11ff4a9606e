//! Scoreboard Viewer Binary
//!
//! Connects to the relay (or any source speaking the snapshot protocol),
//! keeps a bounded window per instrument and logs every chart update.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin scoreboard-viewer
//! ```
//!
//! Type `retry` to reconnect after retries are used up, `quit` to exit.
//!
//! # Environment Variables
//!
//! - `SCOREBOARD_SOURCE_HOST`: Relay host (default: localhost)
//! - `SCOREBOARD_SOURCE_PORT`: Relay port (default: 3000)
//! - `SCOREBOARD_SOURCE_PATH`: Relay path (default: /api/socket)
//! - `SCOREBOARD_MAX_RECONNECT_ATTEMPTS`: Automatic retries (default: 1)
//! - `SCOREBOARD_RECONNECT_DELAY_MS`: Delay before each retry (default: 2000)
//! - `SCOREBOARD_WINDOW`: Samples kept per instrument (default: 1000)
//! - `SCOREBOARD_INSTRUMENT_LABELS`: Display names (default: 1=GOLD,2=BLUE)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use scoreboard_stream::infrastructure::client::{
    DEFAULT_EVENT_CAPACITY, ReconnectingClient, WsConnector,
};
use scoreboard_stream::infrastructure::render::TracingSink;
use scoreboard_stream::infrastructure::telemetry::{self, VIEWER_SERVICE_NAME};
use scoreboard_stream::{ScoreboardConfig, ViewerService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let _ = dotenvy::dotenv();
    let _telemetry_guard = telemetry::init(VIEWER_SERVICE_NAME);

    let config = ScoreboardConfig::from_env().context("invalid viewer configuration")?;
    let settings = config.viewer;
    let url = settings.source_url();
    tracing::info!(
        source = %url,
        max_attempts = settings.retry.max_attempts,
        delay_ms = settings.retry.delay.as_millis(),
        window = settings.window,
        "Starting Scoreboard Viewer"
    );

    let connector = Arc::new(WsConnector::new(url));
    let (handle, events) =
        ReconnectingClient::spawn(connector, settings.retry, DEFAULT_EVENT_CAPACITY);

    let cancel = CancellationToken::new();
    let viewer = ViewerService::new(settings.window, settings.labels, TracingSink::new());
    let viewer_task = tokio::spawn(viewer.run(events, handle.subscribe(), cancel.clone()));

    handle.connect().context("client stopped before connecting")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match line.trim() {
                    "retry" => {
                        if handle.retry().is_err() {
                            break;
                        }
                    }
                    "quit" | "exit" => break,
                    "" => {}
                    other => tracing::warn!(command = other, "Unknown command; use `retry` or `quit`"),
                },
                Ok(None) => {
                    // stdin closed; keep streaming until a signal arrives
                    let _ = tokio::signal::ctrl_c().await;
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            },
        }
    }

    handle.close().await;
    cancel.cancel();

    let viewer = viewer_task.await.context("viewer task panicked")?;
    tracing::info!(
        renders = viewer.sink().renders(),
        version = viewer.aggregator().version(),
        "Scoreboard viewer stopped"
    );
    Ok(())
}
