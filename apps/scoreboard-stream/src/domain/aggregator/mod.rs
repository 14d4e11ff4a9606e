//! Stream Aggregator
//!
//! Turns the unbounded snapshot stream into a bounded, queryable state:
//! one fixed-capacity time series per instrument plus the latest position set.
//!
//! # Design
//!
//! - Series are insertion-ordered by arrival and never re-sorted.
//! - After every append, a series longer than the window drops exactly its
//!   oldest sample, so `len <= window` holds after each single append.
//! - A message carrying `positions` replaces the whole position set.
//! - No I/O and no wall clock: the same message sequence always produces
//!   the same state.
//!
//! Consumers never see the live structure. `view()` produces an immutable
//! [`AggregateView`] stamped with a version that increases on every ingest.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use super::snapshot::{InstrumentKey, PositionRecord, SnapshotMessage};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of samples retained per instrument.
pub const DEFAULT_WINDOW: usize = 1000;

/// Source timestamps are divided by this factor to get display time.
pub const SOURCE_UNITS_PER_DISPLAY_UNIT: f64 = 1_000_000.0;

/// Convert a source timestamp to display units.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_display_time(source_timestamp: i64) -> f64 {
    source_timestamp as f64 / SOURCE_UNITS_PER_DISPLAY_UNIT
}

// =============================================================================
// Time Series
// =============================================================================

/// One `(timestamp, best_bid, best_ask)` point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Timestamp in display units.
    pub timestamp: f64,
    /// Best bid at that time.
    pub best_bid: f64,
    /// Best ask at that time.
    pub best_ask: f64,
}

impl Sample {
    /// Create a new sample.
    #[must_use]
    pub const fn new(timestamp: f64, best_bid: f64, best_ask: f64) -> Self {
        Self {
            timestamp,
            best_bid,
            best_ask,
        }
    }
}

/// Fixed-capacity FIFO of samples for a single instrument.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl TimeSeries {
    /// Create an empty series holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one if the window overflows.
    ///
    /// Returns `true` when a sample was evicted.
    pub fn push(&mut self, sample: Sample) -> bool {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
            return true;
        }
        false
    }

    /// Number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of retained samples.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy the samples out, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// What a single `ingest` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestOutcome {
    /// Aggregator version after the ingest.
    pub version: u64,
    /// Samples appended across all instruments.
    pub samples_appended: usize,
    /// Samples evicted by the window.
    pub samples_evicted: usize,
    /// Instruments seen for the first time.
    pub new_instruments: usize,
    /// Whether the position set was replaced.
    pub positions_replaced: bool,
}

/// Bounded per-instrument state built from snapshot messages.
///
/// # Example
///
/// ```rust
/// use scoreboard_stream::domain::aggregator::{Sample, StreamAggregator};
/// use scoreboard_stream::domain::snapshot::{Identifier, QuoteEntry, SnapshotMessage};
///
/// let mut aggregator = StreamAggregator::default();
/// aggregator.ingest(SnapshotMessage::new(
///     1_000_000,
///     vec![QuoteEntry { instrument: Identifier::Id(1), best_bid: 10.0, best_ask: 11.0 }],
/// ));
///
/// assert_eq!(aggregator.series(&Identifier::Id(1)), vec![Sample::new(1.0, 10.0, 11.0)]);
/// ```
#[derive(Debug, Clone)]
pub struct StreamAggregator {
    window: usize,
    series: BTreeMap<InstrumentKey, TimeSeries>,
    positions: Vec<PositionRecord>,
    version: u64,
}

impl Default for StreamAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl StreamAggregator {
    /// Create an aggregator retaining `window` samples per instrument.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            series: BTreeMap::new(),
            positions: Vec::new(),
            version: 0,
        }
    }

    /// Apply one snapshot message.
    pub fn ingest(&mut self, message: SnapshotMessage) -> IngestOutcome {
        let timestamp = to_display_time(message.timestamp);
        let mut outcome = IngestOutcome::default();

        for entry in message.entries {
            let window = self.window;
            let series = self.series.entry(entry.instrument).or_insert_with(|| {
                outcome.new_instruments += 1;
                TimeSeries::new(window)
            });

            let evicted = series.push(Sample::new(timestamp, entry.best_bid, entry.best_ask));
            outcome.samples_appended += 1;
            if evicted {
                outcome.samples_evicted += 1;
            }
        }

        if let Some(positions) = message.positions {
            self.positions = positions;
            outcome.positions_replaced = true;
        }

        self.version += 1;
        outcome.version = self.version;
        outcome
    }

    /// Ordered copy of an instrument's samples; empty if never seen.
    #[must_use]
    pub fn series(&self, instrument: &InstrumentKey) -> Vec<Sample> {
        self.series
            .get(instrument)
            .map(TimeSeries::to_vec)
            .unwrap_or_default()
    }

    /// Latest positions held in `instrument`.
    #[must_use]
    pub fn positions_for(&self, instrument: &InstrumentKey) -> Vec<PositionRecord> {
        self.positions
            .iter()
            .filter(|p| &p.instrument_key == instrument)
            .cloned()
            .collect()
    }

    /// The full latest position set.
    #[must_use]
    pub fn positions(&self) -> &[PositionRecord] {
        &self.positions
    }

    /// Instruments seen so far, in key order.
    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentKey> {
        self.series.keys()
    }

    /// Number of ingests applied.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Samples retained per instrument.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Produce an immutable snapshot of the current state.
    #[must_use]
    pub fn view(&self) -> AggregateView {
        AggregateView {
            version: self.version,
            series: self
                .series
                .iter()
                .map(|(key, series)| (key.clone(), Arc::from(series.to_vec())))
                .collect(),
            positions: Arc::from(self.positions.clone()),
        }
    }
}

// =============================================================================
// Aggregate View
// =============================================================================

/// Immutable copy of the aggregator state at one version.
///
/// Cloning is cheap: series and positions are shared.
#[derive(Debug, Clone, Default)]
pub struct AggregateView {
    version: u64,
    series: BTreeMap<InstrumentKey, Arc<[Sample]>>,
    positions: Arc<[PositionRecord]>,
}

impl AggregateView {
    /// Aggregator version this view was taken at.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Samples for an instrument, oldest first.
    #[must_use]
    pub fn series(&self, instrument: &InstrumentKey) -> &[Sample] {
        self.series.get(instrument).map(|s| &**s).unwrap_or(&[])
    }

    /// Iterate `(instrument, samples)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentKey, &[Sample])> {
        self.series.iter().map(|(k, v)| (k, &**v))
    }

    /// Positions held in `instrument`.
    pub fn positions_for<'a>(
        &'a self,
        instrument: &'a InstrumentKey,
    ) -> impl Iterator<Item = &'a PositionRecord> + 'a {
        self.positions
            .iter()
            .filter(move |p| &p.instrument_key == instrument)
    }

    /// The full position set.
    #[must_use]
    pub fn positions(&self) -> &[PositionRecord] {
        &self.positions
    }
}

// =============================================================================
// Tests
// =============================================================================
