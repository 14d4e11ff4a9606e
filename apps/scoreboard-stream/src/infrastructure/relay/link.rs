//! Upstream Relay Link
//!
//! One upstream WebSocket with an explicit lifecycle:
//!
//! ```text
//! connecting --open ok--> open --close/failure--> closed
//!      |                                            ^
//!      +------------------open failed---------------+
//! ```
//!
//! Sends are only accepted while the link is open. A link is never reopened.

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::TransportError;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of a relay link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Open in progress, or not yet started.
    Connecting,
    /// Frames flow.
    Open,
    /// Terminal.
    Closed,
}

impl LinkState {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relay link errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The upstream could not be opened.
    #[error("failed to open upstream {target}: {source}")]
    Open {
        /// Upstream URL.
        target: String,
        /// Underlying failure.
        source: TransportError,
    },

    /// The operation needs a different state.
    #[error("upstream link is {0}")]
    InvalidState(LinkState),

    /// Writing a frame failed; the link is now closed.
    #[error(transparent)]
    Send(TransportError),
}

/// What the upstream produced.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A text or binary frame to forward.
    Frame(Message),
    /// The upstream closed, with its close frame if it sent one.
    Closed(Option<CloseFrame>),
    /// The upstream failed.
    Failed(TransportError),
}

/// A single upstream connection owned by one relay pair.
pub struct RelayLink {
    target: String,
    state: LinkState,
    socket: Option<UpstreamSocket>,
}

impl RelayLink {
    /// Create a link to `target` in the connecting state.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: LinkState::Connecting,
            socket: None,
        }
    }

    /// Upstream URL.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Whether frames can be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Open the upstream connection.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Open` on refusal, handshake failure or timeout, after
    /// which the link is closed. Returns `LinkError::InvalidState` unless the
    /// link is still connecting.
    pub async fn open(&mut self, timeout: Duration) -> Result<(), LinkError> {
        if self.state != LinkState::Connecting {
            return Err(LinkError::InvalidState(self.state));
        }

        let result = tokio::time::timeout(
            timeout,
            tokio_tungstenite::connect_async(self.target.as_str()),
        )
        .await;

        match result {
            Ok(Ok((socket, _response))) => {
                self.socket = Some(socket);
                self.state = LinkState::Open;
                tracing::debug!(target_url = %self.target, "Upstream link open");
                Ok(())
            }
            Ok(Err(e)) => Err(self.open_failed(TransportError::Connect(e.to_string()))),
            Err(_) => Err(self.open_failed(TransportError::Timeout(timeout))),
        }
    }

    fn open_failed(&mut self, source: TransportError) -> LinkError {
        self.state = LinkState::Closed;
        LinkError::Open {
            target: self.target.clone(),
            source,
        }
    }

    /// Send a frame upstream.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::InvalidState` when the link is not open, or
    /// `LinkError::Send` when the write fails.
    pub async fn send(&mut self, message: Message) -> Result<(), LinkError> {
        let socket = match (self.state, self.socket.as_mut()) {
            (LinkState::Open, Some(socket)) => socket,
            (state, _) => return Err(LinkError::InvalidState(state)),
        };

        if let Err(e) = socket.send(message).await {
            self.state = LinkState::Closed;
            self.socket = None;
            return Err(LinkError::Send(TransportError::Write(e.to_string())));
        }
        Ok(())
    }

    /// Wait for the next upstream event.
    ///
    /// Never resolves unless the link is open. Cancel-safe.
    pub async fn recv(&mut self) -> LinkEvent {
        if self.state != LinkState::Open {
            return std::future::pending().await;
        }
        let Some(socket) = self.socket.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            match socket.next().await {
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    return LinkEvent::Frame(message);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    self.state = LinkState::Closed;
                    self.socket = None;
                    return LinkEvent::Closed(frame);
                }
                Some(Err(e)) => {
                    self.state = LinkState::Closed;
                    self.socket = None;
                    return LinkEvent::Failed(TransportError::Read(e.to_string()));
                }
                None => {
                    self.state = LinkState::Closed;
                    self.socket = None;
                    return LinkEvent::Failed(TransportError::Dropped);
                }
            }
        }
    }

    /// Close the link, sending `frame` if the socket is still open.
    ///
    /// Idempotent; a connecting link simply becomes closed.
    pub async fn close(&mut self, frame: Option<CloseFrame>) {
        self.state = LinkState::Closed;
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(frame).await {
                tracing::debug!(
                    target_url = %self.target,
                    error = %e,
                    "Upstream close handshake failed"
                );
            }
        }
    }
}

impl fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayLink")
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
