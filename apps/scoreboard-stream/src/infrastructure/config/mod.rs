//! Configuration Module
//!
//! Configuration loading for the relay and viewer processes.

mod settings;

pub use settings::{ConfigError, RELAY_PATH, RelaySettings, ScoreboardConfig, ViewerSettings};
