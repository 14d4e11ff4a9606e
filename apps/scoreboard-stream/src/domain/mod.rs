//! Domain Layer - Core streaming types and state.
//!
//! Pure Rust with serialization support and no I/O. Everything here can be
//! driven from tests without sockets or timers.

/// Snapshot message types (quotes, positions, identifiers).
pub mod snapshot;

/// Bounded per-instrument aggregation of snapshot messages.
pub mod aggregator;

/// Logical connection state machine with bounded retry.
pub mod connection;

/// Chart frames and instrument display labels.
pub mod chart;
