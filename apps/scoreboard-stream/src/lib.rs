#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Scoreboard Stream - Snapshot Relay and Live Viewer
//!
//! A WebSocket relay that gives every downstream viewer its own connection
//! to a market-data snapshot source, and a reconnecting viewer that keeps a
//! bounded per-instrument time series of best bid/ask for live charts.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure state, no I/O
//!   - `snapshot`: Snapshot messages, quotes and positions
//!   - `aggregator`: Bounded per-instrument windows
//!   - `connection`: Logical connection state machine with bounded retry
//!   - `chart`: Chart frames and instrument labels
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Connector, frame stream and render sink contracts
//!   - `services`: The viewer pipeline (events → aggregator → sink)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `relay`: Downstream route, upstream links and pair registry
//!   - `client`: Reconnecting WebSocket client
//!   - `codec`: Snapshot JSON wire format
//!   - `config`, `health`, `metrics`, `render`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                    +-------------------+
//! Viewer 1 <-------->|                   |<--------> Source (link 1)
//! Viewer 2 <-------->|  ConnectionRelay  |<--------> Source (link 2)
//! Viewer N <-------->|                   |<--------> Source (link N)
//!                    +-------------------+
//!
//! ReconnectingClient --events--> ViewerService --RenderUpdate--> RenderSink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::aggregator::{AggregateView, DEFAULT_WINDOW, Sample, StreamAggregator};
pub use domain::chart::{ChartFrame, InstrumentLabels, RenderUpdate};
pub use domain::connection::{ConnectionState, ConnectionStatus, RetryPolicy};
pub use domain::snapshot::{Identifier, PositionRecord, QuoteEntry, SnapshotMessage};

// Ports and services
pub use application::ports::{
    ClientError, ClientEvent, Connector, FrameStream, ProtocolError, RenderSink, TransportError,
    TransportEvent,
};
pub use application::services::ViewerService;

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelaySettings, ScoreboardConfig, ViewerSettings};

// Relay
pub use infrastructure::relay::{ConnectionRelay, RelayRegistry, RelayServer, TeardownReason};

// Client
pub use infrastructure::client::{ClientHandle, ReconnectingClient, WsConnector};

// Codec
pub use infrastructure::codec::SnapshotCodec;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
