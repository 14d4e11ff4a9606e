//! Chart Frames
//!
//! Rendering-facing shapes built from an aggregate view: one frame per
//! instrument with bid and ask point lists and suggested y-axis bounds.
//! The sink receives the full sequence every update and owns any diffing.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;

use super::aggregator::{AggregateView, Sample};
use super::snapshot::{Identifier, InstrumentKey, PositionRecord};

/// Padding added below the lowest and above the highest price.
pub const Y_AXIS_PADDING: f64 = 1.0;

// =============================================================================
// Instrument Labels
// =============================================================================

/// Display names for instrument keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentLabels {
    labels: BTreeMap<InstrumentKey, String>,
}

impl InstrumentLabels {
    /// Labels used by the production exchange.
    #[must_use]
    pub fn production() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(Identifier::Id(1), "GOLD".to_string());
        labels.insert(Identifier::Id(2), "BLUE".to_string());
        Self { labels }
    }

    /// Parse `key=LABEL` pairs separated by commas, e.g. `1=GOLD,2=BLUE`.
    ///
    /// Numeric keys become integer identifiers, anything else a name.
    ///
    /// # Errors
    ///
    /// Returns an error for a pair without `=` or with an empty side.
    pub fn parse(spec: &str) -> Result<Self, LabelParseError> {
        let mut labels = BTreeMap::new();

        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, label) = pair
                .split_once('=')
                .ok_or_else(|| LabelParseError::MissingSeparator(pair.to_string()))?;
            let (key, label) = (key.trim(), label.trim());
            if key.is_empty() || label.is_empty() {
                return Err(LabelParseError::EmptyPart(pair.to_string()));
            }

            let key = key
                .parse::<i64>()
                .map_or_else(|_| Identifier::from(key), Identifier::Id);
            labels.insert(key, label.to_string());
        }

        Ok(Self { labels })
    }

    /// Display name for `instrument`, falling back to the key itself.
    #[must_use]
    pub fn label(&self, instrument: &InstrumentKey) -> Cow<'_, str> {
        self.labels
            .get(instrument)
            .map_or_else(|| Cow::Owned(instrument.to_string()), |l| Cow::Borrowed(l.as_str()))
    }

    /// Number of configured labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no labels are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Error parsing an instrument label list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelParseError {
    /// A pair has no `=`.
    #[error("label pair `{0}` is missing '='")]
    MissingSeparator(String),
    /// A pair has an empty key or label.
    #[error("label pair `{0}` has an empty key or label")]
    EmptyPart(String),
}

// =============================================================================
// Chart Frame
// =============================================================================

/// One plotted point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    /// Time in display units.
    pub x: f64,
    /// Price.
    pub y: f64,
}

/// Everything a chart needs to draw one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    /// Instrument plotted.
    pub instrument: InstrumentKey,
    /// Display name.
    pub label: String,
    /// Best bid line.
    pub bids: Vec<ChartPoint>,
    /// Best ask line.
    pub asks: Vec<ChartPoint>,
    /// Suggested lower y bound, `None` for an empty series.
    pub y_min: Option<f64>,
    /// Suggested upper y bound, `None` for an empty series.
    pub y_max: Option<f64>,
}

impl ChartFrame {
    /// Build a frame from an ordered sample sequence.
    #[must_use]
    pub fn from_samples(instrument: InstrumentKey, label: String, samples: &[Sample]) -> Self {
        let bids: Vec<ChartPoint> = samples
            .iter()
            .map(|s| ChartPoint {
                x: s.timestamp,
                y: s.best_bid,
            })
            .collect();
        let asks: Vec<ChartPoint> = samples
            .iter()
            .map(|s| ChartPoint {
                x: s.timestamp,
                y: s.best_ask,
            })
            .collect();

        let prices = bids.iter().chain(asks.iter()).map(|p| p.y);
        let (y_min, y_max) = prices.fold((None, None), |(lo, hi): (Option<f64>, Option<f64>), y| {
            (
                Some(lo.map_or(y, |lo| lo.min(y))),
                Some(hi.map_or(y, |hi| hi.max(y))),
            )
        });

        Self {
            instrument,
            label,
            bids,
            asks,
            y_min: y_min.map(|v| v - Y_AXIS_PADDING),
            y_max: y_max.map(|v| v + Y_AXIS_PADDING),
        }
    }

    /// Number of samples in the frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bids.len()
    }

    /// Whether the frame has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }
}

// =============================================================================
// Render Update
// =============================================================================

/// One instrument's chart and the positions held in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentPanel {
    /// Chart for the instrument.
    pub frame: ChartFrame,
    /// Latest positions in the instrument.
    pub positions: Vec<PositionRecord>,
}

/// Full state handed to a render sink after an ingest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderUpdate {
    /// Aggregator version the update was built from.
    pub version: u64,
    /// One panel per instrument, in key order.
    pub panels: Vec<InstrumentPanel>,
}

impl RenderUpdate {
    /// Build panels for every instrument in `view`.
    #[must_use]
    pub fn from_view(view: &AggregateView, labels: &InstrumentLabels) -> Self {
        let panels = view
            .iter()
            .map(|(instrument, samples)| InstrumentPanel {
                frame: ChartFrame::from_samples(
                    instrument.clone(),
                    labels.label(instrument).into_owned(),
                    samples,
                ),
                positions: view.positions_for(instrument).cloned().collect(),
            })
            .collect();

        Self {
            version: view.version(),
            panels,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn production_labels() {
        let labels = InstrumentLabels::production();
        assert_eq!(labels.label(&Identifier::Id(1)), "GOLD");
        assert_eq!(labels.label(&Identifier::Id(2)), "BLUE");
        assert_eq!(labels.label(&Identifier::Id(3)), "3");
    }

    #[test]
    fn parse_mixed_keys() {
        let labels = InstrumentLabels::parse("1=GOLD, ES = S&P ,").unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.label(&Identifier::Id(1)), "GOLD");
        assert_eq!(labels.label(&Identifier::from("ES")), "S&P");
    }

    #[test_case("1GOLD" ; "missing separator")]
    #[test_case("=GOLD" ; "empty key")]
    #[test_case("1=" ; "empty label")]
    fn parse_rejects_malformed_pairs(spec: &str) {
        assert!(InstrumentLabels::parse(spec).is_err());
    }

    #[test]
    fn parse_empty_is_empty() {
        assert!(InstrumentLabels::parse("").unwrap().is_empty());
    }

    #[test]
    fn frame_bounds_pad_extremes() {
        let samples = [
            Sample::new(1.0, 10.0, 11.0),
            Sample::new(2.0, 9.5, 12.0),
        ];
        let frame = ChartFrame::from_samples(Identifier::Id(1), "GOLD".to_string(), &samples);

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.y_min, Some(8.5));
        assert_eq!(frame.y_max, Some(13.0));
        assert_eq!(frame.asks[1], ChartPoint { x: 2.0, y: 12.0 });
    }

    #[test]
    fn render_update_pairs_frames_with_positions() {
        use crate::domain::aggregator::StreamAggregator;
        use crate::domain::snapshot::{QuoteEntry, SnapshotMessage};

        let mut aggregator = StreamAggregator::default();
        aggregator.ingest(
            SnapshotMessage::new(
                1_000_000,
                vec![
                    QuoteEntry { instrument: Identifier::Id(2), best_bid: 5.0, best_ask: 6.0 },
                    QuoteEntry { instrument: Identifier::Id(1), best_bid: 10.0, best_ask: 11.0 },
                ],
            )
            .with_positions(vec![PositionRecord {
                client_id: Identifier::Id(7),
                instrument_key: Identifier::Id(2),
                position: -4.0,
                pnl: 1.5,
                volume: 4.0,
            }]),
        );

        let update = RenderUpdate::from_view(&aggregator.view(), &InstrumentLabels::production());
        assert_eq!(update.version, 1);
        assert_eq!(update.panels.len(), 2);
        assert_eq!(update.panels[0].frame.label, "GOLD");
        assert!(update.panels[0].positions.is_empty());
        assert_eq!(update.panels[1].frame.label, "BLUE");
        assert_eq!(update.panels[1].positions.len(), 1);
    }

    #[test]
    fn empty_frame_has_no_bounds() {
        let frame = ChartFrame::from_samples(Identifier::Id(1), "GOLD".to_string(), &[]);
        assert!(frame.is_empty());
        assert_eq!(frame.y_min, None);
        assert_eq!(frame.y_max, None);
    }
}
