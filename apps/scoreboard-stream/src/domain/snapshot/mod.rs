//! Snapshot Types
//!
//! Codec-agnostic representation of one inbound market-data update:
//! best bid/ask per instrument and, optionally, the full position set.
//!
//! The wire shape lives in `infrastructure::codec`; everything here is the
//! canonical internal form handed to the aggregator.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque identifier used for instruments and clients.
///
/// The production source sends integers, but string keys are accepted so the
/// relay and aggregator stay agnostic to how a venue names its symbols.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    /// Numeric identifier.
    Id(i64),
    /// Textual identifier.
    Name(String),
}

/// Key naming a tradable instrument.
pub type InstrumentKey = Identifier;

/// Key naming a trading client in the position set.
pub type ClientId = Identifier;

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

// =============================================================================
// Snapshot Message
// =============================================================================

/// Best bid/ask for one instrument at the message timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteEntry {
    /// Instrument this quote belongs to.
    pub instrument: InstrumentKey,
    /// Best bid price.
    pub best_bid: f64,
    /// Best ask price.
    pub best_ask: f64,
}

/// One client's position in one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Client holding the position.
    pub client_id: ClientId,
    /// Instrument the position is in.
    pub instrument_key: InstrumentKey,
    /// Signed position size.
    pub position: f64,
    /// Marked profit and loss, net of fees.
    pub pnl: f64,
    /// Traded volume.
    pub volume: f64,
}

/// One inbound update from the snapshot source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    /// Source timestamp in source units (nanoseconds on the production feed).
    pub timestamp: i64,
    /// Quotes in the order the source listed them.
    pub entries: Vec<QuoteEntry>,
    /// Full position set, when the message carries one.
    pub positions: Option<Vec<PositionRecord>>,
}

impl SnapshotMessage {
    /// Create a message without positions.
    #[must_use]
    pub const fn new(timestamp: i64, entries: Vec<QuoteEntry>) -> Self {
        Self {
            timestamp,
            entries,
            positions: None,
        }
    }

    /// Attach a full position set.
    #[must_use]
    pub fn with_positions(mut self, positions: Vec<PositionRecord>) -> Self {
        self.positions = Some(positions);
        self
    }
}
