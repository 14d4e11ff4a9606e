//! Port Interfaces
//!
//! Contracts between the application and its adapters, following the
//! hexagonal layout of the rest of the crate.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: opens a transport to the snapshot source
//! - `FrameStream`: one open transport, yielding inbound frames
//! - `RenderSink`: receives chart updates and connection status
//!
//! Errors and events shared by every adapter (`TransportError`,
//! `ProtocolError`, `ClientEvent`) are defined here as well.
//!
//! The reconnecting client only sees these traits, so its tests feed
//! synthetic transport events without opening a socket.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::chart::RenderUpdate;
use crate::domain::connection::ConnectionStatus;
use crate::domain::snapshot::SnapshotMessage;

// =============================================================================
// Transport
// =============================================================================

/// Socket-level failure on either the relay or the consumer side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Opening the connection took too long.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Reading from the connection failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Writing to the connection failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Peer closed with a non-normal close code.
    #[error("closed abnormally with code {code}: {reason}")]
    AbnormalClose {
        /// WebSocket close code.
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// Stream ended without a close frame.
    #[error("connection dropped without a close frame")]
    Dropped,
}

/// Inbound payload that could not be turned into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON or does not match the snapshot shape.
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    /// Binary payload is not valid UTF-8.
    #[error("binary payload is not UTF-8")]
    NotUtf8,
}

/// One event read from an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Peer closed normally.
    Closed,
    /// Transport failed; no further events follow.
    Failed(TransportError),
}

/// An open transport to the snapshot source.
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next inbound event.
    ///
    /// Must be cancel-safe: dropping the future loses no frame.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the transport. Calling it more than once is a no-op.
    async fn close(&mut self);
}

/// Opens transports to the snapshot source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport.
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError>;
}

// =============================================================================
// Client Events
// =============================================================================

/// Error surfaced by the reconnecting client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message was discarded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Automatic retries are used up.
    #[error("gave up after {0} reconnect attempts")]
    Exhausted(u32),
}

/// Event emitted by the reconnecting client.
///
/// Events belonging to one connection attempt are delivered in the order
/// they happened; nothing is promised across attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Transport opened.
    Open,
    /// Something failed; the status channel carries the resulting state.
    Error(ClientError),
    /// A decoded snapshot.
    Message(SnapshotMessage),
    /// An open transport closed.
    ///
    /// Only follows an `Open` from the same attempt. A failed connect
    /// attempt yields `Error` alone.
    Close,
}

// =============================================================================
// Rendering
// =============================================================================

/// Consumer of aggregate updates, e.g. a chart.
///
/// Every update carries the full ordered series for every instrument;
/// diffing and efficient redraw are the sink's business.
pub trait RenderSink: Send {
    /// Draw a new aggregate state.
    fn render(&mut self, update: &RenderUpdate);

    /// Connection status changed.
    fn status(&mut self, _status: &ConnectionStatus) {}
}
