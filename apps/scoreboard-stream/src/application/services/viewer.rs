//! Viewer Service
//!
//! Owns the stream aggregator for one consumer. Decoded snapshots are
//! ingested in arrival order and every ingest hands the sink a full
//! [`RenderUpdate`]; connection status changes are forwarded as they happen.

use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ClientError, ClientEvent, RenderSink};
use crate::domain::aggregator::StreamAggregator;
use crate::domain::chart::{InstrumentLabels, RenderUpdate};
use crate::domain::connection::ConnectionStatus;
use crate::infrastructure::metrics;

/// Drives a [`StreamAggregator`] from client events and renders into a sink.
pub struct ViewerService<S: RenderSink> {
    aggregator: StreamAggregator,
    labels: InstrumentLabels,
    sink: S,
}

impl<S: RenderSink> ViewerService<S> {
    /// Create a service keeping `window` samples per instrument.
    #[must_use]
    pub fn new(window: usize, labels: InstrumentLabels, sink: S) -> Self {
        Self {
            aggregator: StreamAggregator::new(window),
            labels,
            sink,
        }
    }

    /// Apply one client event.
    ///
    /// Returns the aggregate version rendered, if the event produced one.
    pub fn handle_event(&mut self, event: ClientEvent) -> Option<u64> {
        match event {
            ClientEvent::Message(message) => {
                let started = Instant::now();
                let outcome = self.aggregator.ingest(message);

                if outcome.new_instruments > 0 {
                    tracing::info!(
                        new_instruments = outcome.new_instruments,
                        total = self.aggregator.instruments().count(),
                        "New instruments in stream"
                    );
                }

                let update = RenderUpdate::from_view(&self.aggregator.view(), &self.labels);
                self.sink.render(&update);

                metrics::record_samples(outcome.samples_appended, outcome.samples_evicted);
                metrics::record_ingest_duration(started.elapsed());
                Some(outcome.version)
            }
            ClientEvent::Error(ClientError::Protocol(e)) => {
                tracing::warn!(error = %e, "Discarded inbound message");
                metrics::record_protocol_error();
                None
            }
            ClientEvent::Error(e) => {
                tracing::warn!(error = %e, "Connection error");
                None
            }
            ClientEvent::Open => {
                tracing::info!("Connected to snapshot source");
                None
            }
            ClientEvent::Close => {
                tracing::info!("Disconnected from snapshot source");
                None
            }
        }
    }

    /// Forward a connection status change to the sink.
    pub fn handle_status(&mut self, status: &ConnectionStatus) {
        tracing::debug!(
            state = %status.state,
            attempts = status.attempts,
            exhausted = status.exhausted,
            "Connection status changed"
        );
        self.sink.status(status);
    }

    /// Process events until the event channel closes or `cancel` fires.
    ///
    /// The current status is rendered once on entry. Returns the service so
    /// callers can inspect the final state.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ClientEvent>,
        mut status: watch::Receiver<ConnectionStatus>,
        cancel: CancellationToken,
    ) -> Self {
        let initial = status.borrow_and_update().clone();
        self.handle_status(&initial);
        let mut status_open = true;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!("Viewer service cancelled");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            self.handle_event(event);
                        }
                        None => {
                            tracing::debug!("Client event channel closed");
                            break;
                        }
                    }
                }
                changed = status.changed(), if status_open => {
                    if changed.is_ok() {
                        let current = status.borrow_and_update().clone();
                        self.handle_status(&current);
                    } else {
                        status_open = false;
                    }
                }
            }
        }

        self
    }

    /// The aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &StreamAggregator {
        &self.aggregator
    }

    /// The sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the service and return the sink.
    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::ProtocolError;
    use crate::domain::connection::ConnectionState;
    use crate::domain::snapshot::{Identifier, PositionRecord, QuoteEntry, SnapshotMessage};

    #[derive(Default)]
    struct RecordingSink {
        updates: Vec<RenderUpdate>,
        statuses: Vec<ConnectionStatus>,
    }

    impl RenderSink for RecordingSink {
        fn render(&mut self, update: &RenderUpdate) {
            self.updates.push(update.clone());
        }

        fn status(&mut self, status: &ConnectionStatus) {
            self.statuses.push(status.clone());
        }
    }

    fn quote(symbol: i64, bid: f64, ask: f64) -> QuoteEntry {
        QuoteEntry {
            instrument: Identifier::Id(symbol),
            best_bid: bid,
            best_ask: ask,
        }
    }

    fn service() -> ViewerService<RecordingSink> {
        ViewerService::new(
            1000,
            InstrumentLabels::production(),
            RecordingSink::default(),
        )
    }

    #[test]
    fn message_renders_full_series() {
        let mut svc = service();

        assert_eq!(
            svc.handle_event(ClientEvent::Message(SnapshotMessage::new(
                1_000_000,
                vec![quote(1, 10.0, 11.0)],
            ))),
            Some(1)
        );
        assert_eq!(
            svc.handle_event(ClientEvent::Message(SnapshotMessage::new(
                2_000_000,
                vec![quote(1, 10.5, 11.5)],
            ))),
            Some(2)
        );

        let sink = svc.sink();
        assert_eq!(sink.updates.len(), 2);
        let frame = &sink.updates[1].panels[0].frame;
        assert_eq!(frame.label, "GOLD");
        assert_eq!(frame.len(), 2);
        assert!((frame.bids[0].x - 1.0).abs() < f64::EPSILON);
        assert!((frame.asks[1].y - 11.5).abs() < f64::EPSILON);
    }

    #[test]
    fn errors_and_lifecycle_events_do_not_render() {
        let mut svc = service();

        assert_eq!(
            svc.handle_event(ClientEvent::Error(ClientError::Protocol(
                ProtocolError::NotUtf8
            ))),
            None
        );
        assert_eq!(svc.handle_event(ClientEvent::Open), None);
        assert_eq!(svc.handle_event(ClientEvent::Close), None);
        assert!(svc.sink().updates.is_empty());
        assert_eq!(svc.aggregator().version(), 0);
    }

    #[test]
    fn positions_reach_the_matching_panel() {
        let mut svc = service();
        svc.handle_event(ClientEvent::Message(
            SnapshotMessage::new(1_000_000, vec![quote(1, 10.0, 11.0), quote(2, 5.0, 6.0)])
                .with_positions(vec![PositionRecord {
                    client_id: Identifier::Id(9),
                    instrument_key: Identifier::Id(2),
                    position: 3.0,
                    pnl: 0.5,
                    volume: 3.0,
                }]),
        ));

        let update = &svc.sink().updates[0];
        assert!(update.panels[0].positions.is_empty());
        assert_eq!(update.panels[1].positions[0].client_id, Identifier::Id(9));
    }

    #[tokio::test]
    async fn run_drains_events_and_statuses() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(service().run(event_rx, status_rx, cancel));

        status_tx.send_modify(|s| s.state = ConnectionState::Connected);
        event_tx
            .send(ClientEvent::Message(SnapshotMessage::new(
                1_000_000,
                vec![quote(1, 10.0, 11.0)],
            )))
            .await
            .unwrap();
        drop(event_tx);

        let svc = handle.await.unwrap();
        assert_eq!(svc.aggregator().series(&Identifier::Id(1)).len(), 1);

        let sink = svc.into_sink();
        assert_eq!(sink.updates.len(), 1);
        assert_eq!(
            sink.statuses.last().map(|s| s.state),
            Some(ConnectionState::Connected)
        );
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (_event_tx, event_rx) = mpsc::channel::<ClientEvent>(8);
        let (_status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(service().run(event_rx, status_rx, cancel.clone()));
        cancel.cancel();

        let svc = handle.await.unwrap();
        assert!(svc.sink().updates.is_empty());
    }
}
