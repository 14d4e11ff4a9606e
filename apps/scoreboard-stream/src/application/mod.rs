//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for transports and render sinks.
pub mod ports;

/// Application services driving the viewer.
pub mod services;
