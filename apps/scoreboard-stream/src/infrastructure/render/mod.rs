//! Log-Based Render Sink
//!
//! Headless [`RenderSink`] for the viewer binary. Each update is reduced to a
//! one-line summary per instrument and written through `tracing`, so a
//! terminal or a log pipeline can follow the live chart without a GUI.

use serde::Serialize;

use crate::application::ports::RenderSink;
use crate::domain::chart::{InstrumentPanel, RenderUpdate};
use crate::domain::connection::{ConnectionState, ConnectionStatus};

/// What gets logged for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSummary {
    /// Display name.
    pub label: String,
    /// Samples in the window.
    pub samples: usize,
    /// Most recent best bid.
    pub best_bid: Option<f64>,
    /// Most recent best ask.
    pub best_ask: Option<f64>,
    /// Suggested y-axis lower bound.
    pub y_min: Option<f64>,
    /// Suggested y-axis upper bound.
    pub y_max: Option<f64>,
    /// Positions held in the instrument.
    pub positions: usize,
    /// Net position across clients.
    pub net_position: f64,
    /// Total pnl across clients.
    pub total_pnl: f64,
}

impl PanelSummary {
    /// Summarize one panel.
    #[must_use]
    pub fn from_panel(panel: &InstrumentPanel) -> Self {
        let frame = &panel.frame;
        Self {
            label: frame.label.clone(),
            samples: frame.len(),
            best_bid: frame.bids.last().map(|p| p.y),
            best_ask: frame.asks.last().map(|p| p.y),
            y_min: frame.y_min,
            y_max: frame.y_max,
            positions: panel.positions.len(),
            net_position: panel.positions.iter().map(|p| p.position).sum(),
            total_pnl: panel.positions.iter().map(|p| p.pnl).sum(),
        }
    }
}

/// Writes chart updates and status changes to the log.
#[derive(Debug, Default)]
pub struct TracingSink {
    renders: u64,
    last_version: Option<u64>,
    last_state: Option<ConnectionState>,
}

impl TracingSink {
    /// Create a sink that has rendered nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates rendered so far.
    #[must_use]
    pub const fn renders(&self) -> u64 {
        self.renders
    }

    /// Version of the last rendered update.
    #[must_use]
    pub const fn last_version(&self) -> Option<u64> {
        self.last_version
    }

    /// State from the last status change.
    #[must_use]
    pub const fn last_state(&self) -> Option<ConnectionState> {
        self.last_state
    }
}

impl RenderSink for TracingSink {
    fn render(&mut self, update: &RenderUpdate) {
        self.renders += 1;
        self.last_version = Some(update.version);

        for panel in &update.panels {
            let summary = PanelSummary::from_panel(panel);
            tracing::info!(
                version = update.version,
                instrument = %summary.label,
                samples = summary.samples,
                best_bid = ?summary.best_bid,
                best_ask = ?summary.best_ask,
                y_min = ?summary.y_min,
                y_max = ?summary.y_max,
                positions = summary.positions,
                net_position = summary.net_position,
                total_pnl = summary.total_pnl,
                "Chart updated"
            );
        }
    }

    fn status(&mut self, status: &ConnectionStatus) {
        if self.last_state == Some(status.state) && status.last_error.is_none() {
            return;
        }
        self.last_state = Some(status.state);

        match status.state {
            ConnectionState::Disconnected if status.exhausted => tracing::warn!(
                attempts = status.attempts,
                max_attempts = status.max_attempts,
                error = ?status.last_error,
                "Connection lost; type `retry` to reconnect"
            ),
            ConnectionState::Error => tracing::warn!(
                attempts = status.attempts,
                max_attempts = status.max_attempts,
                error = ?status.last_error,
                "Connection error"
            ),
            state => tracing::info!(
                state = %state,
                attempts = status.attempts,
                "Connection status"
            ),
        }
    }
}
