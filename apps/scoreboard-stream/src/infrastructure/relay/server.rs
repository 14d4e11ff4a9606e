//! Connection Relay Server
//!
//! Serves WebSocket upgrades on [`RELAY_PATH`] and bridges each downstream
//! socket to its own upstream [`RelayLink`].
//!
//! # Pair Lifecycle
//!
//! 1. Register the pair and start opening the upstream link.
//! 2. While the link is connecting, downstream data frames are dropped.
//! 3. If the open fails, close downstream with 1011 and tear the pair down.
//! 4. Otherwise forward text and binary frames both ways until either leg
//!    closes or fails, then close the other leg and tear the pair down.
//!
//! Each pair runs in one task, so both legs are always closed together.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{
    CloseFrame as DownstreamCloseFrame, Message as DownstreamMessage, Utf8Bytes, WebSocket,
    WebSocketUpgrade,
};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use super::link::{LinkEvent, RelayLink};
use super::registry::{PairHandle, RelayRegistry, TeardownReason};
use crate::infrastructure::client::{CLOSE_GOING_AWAY, CLOSE_NORMAL};
use crate::infrastructure::config::{RELAY_PATH, RelaySettings};
use crate::infrastructure::metrics::{self, Direction};

/// Close code sent downstream when the upstream fails.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

const REASON_UPSTREAM_UNAVAILABLE: &str = "upstream unavailable";
const REASON_UPSTREAM_FAILED: &str = "upstream connection failed";
const REASON_SHUTDOWN: &str = "relay shutting down";

// =============================================================================
// Connection Relay
// =============================================================================

/// Bridges downstream viewers to the upstream snapshot source.
#[derive(Debug)]
pub struct ConnectionRelay {
    settings: RelaySettings,
    registry: Arc<RelayRegistry>,
    shutdown: CancellationToken,
}

impl ConnectionRelay {
    /// Create a relay.
    #[must_use]
    pub const fn new(
        settings: RelaySettings,
        registry: Arc<RelayRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            registry,
            shutdown,
        }
    }

    /// Pair registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    /// Relay settings.
    #[must_use]
    pub const fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Router serving the relay route. The upgrade handler reads the peer
    /// address, so the router must be served with connect info, as [`serve`]
    /// does.
    fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(RELAY_PATH, get(upgrade_handler))
            .with_state(self)
    }

    /// Run one relay pair for an accepted downstream socket.
    ///
    /// Returns once both legs are closed and the pair is removed.
    pub async fn on_downstream_connect(&self, downstream: WebSocket, peer: Option<SocketAddr>) {
        let pair = self.registry.register(peer, &self.shutdown);
        let mut link = RelayLink::new(self.settings.upstream_url());

        tracing::info!(
            pair_id = %pair.id(),
            peer = ?peer,
            upstream = %link.target(),
            "Downstream connected"
        );

        let reason = self.run_pair(downstream, &mut link, &pair).await;
        link.close(None).await;
        pair.teardown(reason);
    }

    async fn run_pair(
        &self,
        mut downstream: WebSocket,
        link: &mut RelayLink,
        pair: &PairHandle,
    ) -> TeardownReason {
        let cancel = pair.cancel_token().clone();

        match self.open_upstream(&mut downstream, link, &cancel).await {
            OpenOutcome::Open => {}
            OpenOutcome::Failed(e) => {
                tracing::warn!(pair_id = %pair.id(), error = %e, "Upstream unavailable");
                close_downstream(
                    &mut downstream,
                    CLOSE_INTERNAL_ERROR,
                    REASON_UPSTREAM_UNAVAILABLE,
                )
                .await;
                return TeardownReason::UpstreamUnavailable;
            }
            OpenOutcome::Ended(reason) => {
                if reason == TeardownReason::Shutdown {
                    close_downstream(&mut downstream, CLOSE_GOING_AWAY, REASON_SHUTDOWN).await;
                }
                return reason;
            }
        }

        loop {
            let step = tokio::select! {
                biased;

                () = cancel.cancelled() => PairStep::Cancelled,
                message = downstream.recv() => PairStep::Downstream(message),
                event = link.recv() => PairStep::Upstream(event),
            };

            match step {
                PairStep::Cancelled => {
                    link.close(Some(going_away_upstream())).await;
                    close_downstream(&mut downstream, CLOSE_GOING_AWAY, REASON_SHUTDOWN).await;
                    return TeardownReason::Shutdown;
                }
                PairStep::Downstream(Some(Ok(message))) => {
                    let message = match message {
                        DownstreamMessage::Text(text) => {
                            UpstreamMessage::text(text.as_str().to_owned())
                        }
                        DownstreamMessage::Binary(bytes) => UpstreamMessage::Binary(bytes),
                        DownstreamMessage::Close(frame) => {
                            link.close(frame.map(to_upstream_close)).await;
                            return TeardownReason::DownstreamClosed;
                        }
                        DownstreamMessage::Ping(_) | DownstreamMessage::Pong(_) => continue,
                    };
                    if let Err(reason) = forward_upstream(link, message, pair).await {
                        close_downstream(
                            &mut downstream,
                            CLOSE_INTERNAL_ERROR,
                            REASON_UPSTREAM_FAILED,
                        )
                        .await;
                        return reason;
                    }
                }
                PairStep::Downstream(Some(Err(e))) => {
                    tracing::debug!(pair_id = %pair.id(), error = %e, "Downstream read failed");
                    return TeardownReason::DownstreamError;
                }
                PairStep::Downstream(None) => return TeardownReason::DownstreamClosed,
                PairStep::Upstream(LinkEvent::Frame(message)) => {
                    let Some(message) = to_downstream_message(message) else {
                        continue;
                    };
                    if let Err(e) = downstream.send(message).await {
                        tracing::debug!(pair_id = %pair.id(), error = %e, "Downstream write failed");
                        return TeardownReason::DownstreamError;
                    }
                    metrics::record_frame_forwarded(Direction::Downstream);
                }
                PairStep::Upstream(LinkEvent::Closed(frame)) => {
                    let frame = frame.map_or_else(
                        || DownstreamCloseFrame {
                            code: CLOSE_NORMAL,
                            reason: Utf8Bytes::from_static(""),
                        },
                        to_downstream_close,
                    );
                    let _ = downstream
                        .send(DownstreamMessage::Close(Some(frame)))
                        .await;
                    return TeardownReason::UpstreamClosed;
                }
                PairStep::Upstream(LinkEvent::Failed(e)) => {
                    tracing::warn!(pair_id = %pair.id(), error = %e, "Upstream failed");
                    close_downstream(
                        &mut downstream,
                        CLOSE_INTERNAL_ERROR,
                        REASON_UPSTREAM_FAILED,
                    )
                    .await;
                    return TeardownReason::UpstreamError;
                }
            }
        }
    }

    async fn open_upstream(
        &self,
        downstream: &mut WebSocket,
        link: &mut RelayLink,
        cancel: &CancellationToken,
    ) -> OpenOutcome {
        let timeout = self.settings.upstream_connect_timeout;
        let open = link.open(timeout);
        tokio::pin!(open);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return OpenOutcome::Ended(TeardownReason::Shutdown),
                result = &mut open => {
                    self.registry.record_upstream_open(result.is_ok());
                    return match result {
                        Ok(()) => OpenOutcome::Open,
                        Err(e) => OpenOutcome::Failed(e.to_string()),
                    };
                }
                message = downstream.recv() => match message {
                    Some(Ok(DownstreamMessage::Text(_) | DownstreamMessage::Binary(_))) => {
                        metrics::record_frame_dropped(Direction::Upstream);
                    }
                    Some(Ok(DownstreamMessage::Ping(_) | DownstreamMessage::Pong(_))) => {}
                    Some(Ok(DownstreamMessage::Close(_))) | None => {
                        return OpenOutcome::Ended(TeardownReason::DownstreamClosed);
                    }
                    Some(Err(_)) => return OpenOutcome::Ended(TeardownReason::DownstreamError),
                },
            }
        }
    }
}

enum OpenOutcome {
    Open,
    Failed(String),
    Ended(TeardownReason),
}

enum PairStep {
    Cancelled,
    Downstream(Option<Result<DownstreamMessage, axum::Error>>),
    Upstream(LinkEvent),
}

async fn forward_upstream(
    link: &mut RelayLink,
    message: UpstreamMessage,
    pair: &PairHandle,
) -> Result<(), TeardownReason> {
    if !link.is_open() {
        metrics::record_frame_dropped(Direction::Upstream);
        return Ok(());
    }
    match link.send(message).await {
        Ok(()) => {
            metrics::record_frame_forwarded(Direction::Upstream);
            Ok(())
        }
        Err(e) => {
            tracing::warn!(pair_id = %pair.id(), error = %e, "Upstream write failed");
            Err(TeardownReason::UpstreamError)
        }
    }
}

async fn close_downstream(downstream: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = DownstreamCloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    if let Err(e) = downstream.send(DownstreamMessage::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Downstream close failed");
    }
}

fn to_downstream_message(message: UpstreamMessage) -> Option<DownstreamMessage> {
    match message {
        UpstreamMessage::Text(text) => {
            Some(DownstreamMessage::Text(text.as_str().to_owned().into()))
        }
        UpstreamMessage::Binary(bytes) => Some(DownstreamMessage::Binary(bytes)),
        _ => None,
    }
}

fn to_upstream_close(frame: DownstreamCloseFrame) -> UpstreamCloseFrame {
    UpstreamCloseFrame {
        code: CloseCode::from(frame.code),
        reason: frame.reason.as_str().to_owned().into(),
    }
}

fn to_downstream_close(frame: UpstreamCloseFrame) -> DownstreamCloseFrame {
    DownstreamCloseFrame {
        code: u16::from(frame.code),
        reason: frame.reason.as_str().to_owned().into(),
    }
}

fn going_away_upstream() -> UpstreamCloseFrame {
    UpstreamCloseFrame {
        code: CloseCode::Away,
        reason: REASON_SHUTDOWN.into(),
    }
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(relay): State<Arc<ConnectionRelay>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        relay.on_downstream_connect(socket, Some(peer)).await;
    })
}

// =============================================================================
// Relay Server
// =============================================================================

/// Relay HTTP server.
pub struct RelayServer {
    port: u16,
    relay: Arc<ConnectionRelay>,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Create a relay server.
    #[must_use]
    pub const fn new(port: u16, relay: Arc<ConnectionRelay>, cancel: CancellationToken) -> Self {
        Self {
            port,
            relay,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayServerError` if binding fails or the server fails.
    pub async fn run(self) -> Result<(), RelayServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayServerError::BindFailed(self.port, e.to_string()))?;

        serve(listener, self.relay, self.cancel).await
    }
}

/// Serve the relay route on an already bound listener until cancelled.
///
/// Pairs still running at cancellation close both legs with 1001.
///
/// # Errors
///
/// Returns `RelayServerError::ServerFailed` if the HTTP server fails.
pub async fn serve(
    listener: TcpListener,
    relay: Arc<ConnectionRelay>,
    cancel: CancellationToken,
) -> Result<(), RelayServerError> {
    let local = listener.local_addr().ok();
    tracing::info!(
        addr = ?local,
        path = RELAY_PATH,
        upstream = %relay.settings().upstream_url(),
        "Relay listening"
    );

    let app = Arc::clone(&relay).router();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await
    .map_err(|e| RelayServerError::ServerFailed(e.to_string()))?;

    tracing::info!(active = relay.registry().active(), "Relay stopped");
    Ok(())
}

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
