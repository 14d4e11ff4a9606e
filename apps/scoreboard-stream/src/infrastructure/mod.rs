//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the relay server itself.

/// Reconnecting WebSocket client for the viewer side.
pub mod client;

/// Snapshot wire format.
pub mod codec;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// WebSocket relay between viewers and the snapshot source.
pub mod relay;

/// Log-based render sink.
pub mod render;

/// OpenTelemetry tracing integration.
pub mod telemetry;
