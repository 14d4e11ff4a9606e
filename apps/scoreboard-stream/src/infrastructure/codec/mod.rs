//! Snapshot Codec
//!
//! JSON decoding for the snapshot wire format.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "timestamp": 1700000000000000000,
//!   "snapshot": { "0": { "symbol": 1, "best_bid": 10.0, "best_ask": 11.0 } },
//!   "positions": [{ "client_id": 3, "symbol": 1, "position": 5, "pnl": -1.2, "volume": 9 }]
//! }
//! ```
//!
//! The production source sends `snapshot` as a JSON array instead of an
//! index-keyed object; both are accepted. Object entries are visited in
//! ascending numeric index order. `positions` is optional and unknown fields
//! are ignored, so the source may add fields without breaking consumers.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::application::ports::ProtocolError;
use crate::domain::snapshot::{Identifier, PositionRecord, QuoteEntry, SnapshotMessage};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireSnapshot {
    timestamp: i64,
    snapshot: WireEntries,
    #[serde(default)]
    positions: Option<Vec<WirePosition>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireEntries {
    List(Vec<WireQuote>),
    Indexed(BTreeMap<String, WireQuote>),
}

#[derive(Debug, Deserialize)]
struct WireQuote {
    symbol: Identifier,
    best_bid: f64,
    best_ask: f64,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    client_id: Identifier,
    symbol: Identifier,
    position: f64,
    pnl: f64,
    volume: f64,
}

impl WireEntries {
    fn into_quotes(self) -> Vec<QuoteEntry> {
        let ordered: Vec<WireQuote> = match self {
            Self::List(list) => list,
            Self::Indexed(map) => {
                let mut indexed: Vec<(Option<u64>, String, WireQuote)> = map
                    .into_iter()
                    .map(|(key, quote)| (key.parse::<u64>().ok(), key, quote))
                    .collect();
                // Numeric indices first in numeric order, then any other keys.
                indexed.sort_by(|a, b| match (a.0, b.0) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => a.1.cmp(&b.1),
                });
                indexed.into_iter().map(|(_, _, quote)| quote).collect()
            }
        };

        ordered
            .into_iter()
            .map(|q| QuoteEntry {
                instrument: q.symbol,
                best_bid: q.best_bid,
                best_ask: q.best_ask,
            })
            .collect()
    }
}

impl From<WirePosition> for PositionRecord {
    fn from(p: WirePosition) -> Self {
        Self {
            client_id: p.client_id,
            instrument_key: p.symbol,
            position: p.position,
            pnl: p.pnl,
            volume: p.volume,
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// JSON codec for snapshot messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text payload.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Malformed` if the payload is not a snapshot.
    pub fn decode(&self, text: &str) -> Result<SnapshotMessage, ProtocolError> {
        let wire: WireSnapshot =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        Ok(SnapshotMessage {
            timestamp: wire.timestamp,
            entries: wire.snapshot.into_quotes(),
            positions: wire
                .positions
                .map(|positions| positions.into_iter().map(PositionRecord::from).collect()),
        })
    }

    /// Decode a binary payload holding UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotUtf8` for non-UTF-8 bytes, otherwise the
    /// same errors as [`decode`](Self::decode).
    pub fn decode_binary(&self, bytes: &[u8]) -> Result<SnapshotMessage, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        self.decode(text)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn decode_indexed_object() {
        let codec = SnapshotCodec::new();
        let msg = codec
            .decode(r#"{"timestamp":1000000,"snapshot":{"0":{"symbol":1,"best_bid":10,"best_ask":11}}}"#)
            .unwrap();

        assert_eq!(msg.timestamp, 1_000_000);
        assert_eq!(
            msg.entries,
            vec![QuoteEntry {
                instrument: Identifier::Id(1),
                best_bid: 10.0,
                best_ask: 11.0,
            }]
        );
        assert_eq!(msg.positions, None);
    }

    #[test]
    fn decode_array_with_positions() {
        let codec = SnapshotCodec::new();
        let text = r#"{ "timestamp": 1699999999000000000, "snapshot": [
            {"symbol": 1, "best_bid": 100, "best_ask": 101},
            {"symbol": 2, "best_bid": 50.5, "best_ask": 51}
        ], "positions": [
            {"client_id": 4, "symbol": 1, "position": -3, "pnl": 12.5, "volume": 7}
        ]}"#;
        let msg = codec.decode(text).unwrap();

        assert_eq!(msg.entries.len(), 2);
        assert_eq!(msg.entries[1].instrument, Identifier::Id(2));
        let positions = msg.positions.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].client_id, Identifier::Id(4));
        assert_eq!(positions[0].instrument_key, Identifier::Id(1));
        assert!((positions[0].position + 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn indexed_entries_follow_numeric_order() {
        let codec = SnapshotCodec::new();
        let text = r#"{"timestamp":0,"snapshot":{
            "10":{"symbol":3,"best_bid":1,"best_ask":2},
            "2":{"symbol":2,"best_bid":1,"best_ask":2},
            "0":{"symbol":1,"best_bid":1,"best_ask":2}
        }}"#;
        let msg = codec.decode(text).unwrap();
        let order: Vec<_> = msg.entries.iter().map(|e| e.instrument.clone()).collect();
        assert_eq!(order, vec![Identifier::Id(1), Identifier::Id(2), Identifier::Id(3)]);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let codec = SnapshotCodec::new();
        let msg = codec
            .decode(r#"{"timestamp":5,"venue":"ndfex","snapshot":[{"symbol":1,"best_bid":1,"best_ask":2,"depth":3}]}"#)
            .unwrap();
        assert_eq!(msg.entries.len(), 1);
    }

    #[test]
    fn null_positions_means_absent() {
        let codec = SnapshotCodec::new();
        let msg = codec
            .decode(r#"{"timestamp":5,"snapshot":[],"positions":null}"#)
            .unwrap();
        assert_eq!(msg.positions, None);
    }

    #[test_case("not json" ; "garbage")]
    #[test_case(r#"{"snapshot":[]}"# ; "missing timestamp")]
    #[test_case(r#"{"timestamp":1}"# ; "missing snapshot")]
    #[test_case(r#"{"timestamp":1,"snapshot":[{"symbol":1,"best_bid":"x","best_ask":2}]}"# ; "bad price")]
    #[test_case(r#"[1,2,3]"# ; "wrong top level")]
    fn malformed_payloads_are_protocol_errors(text: &str) {
        let err = SnapshotCodec::new().decode(text).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn binary_payload_must_be_utf8() {
        let codec = SnapshotCodec::new();
        assert_eq!(
            codec.decode_binary(&[0xff, 0xfe, 0x00]).unwrap_err(),
            ProtocolError::NotUtf8
        );
        assert!(codec.decode_binary(br#"{"timestamp":1,"snapshot":[]}"#).is_ok());
    }
}
