//! Reconnecting Client
//!
//! Keeps one logical connection to the snapshot source. A single driver task
//! owns the [`ConnectionMachine`], the live transport and the retry deadline;
//! callers talk to it through a [`ClientHandle`] and observe it through an
//! event channel and a status watch.
//!
//! # Lifecycle
//!
//! ```text
//! disconnected -> connecting -> connected
//!                     |             |
//!                     +--> error <--+
//!                            |
//!            attempts < max  |  attempts >= max
//!          (retry after delay)  (disconnected, exhausted)
//! ```
//!
//! Every retry timer carries the generation of the attempt that scheduled it,
//! so closing or reconnecting invalidates timers still in flight. Dropping the
//! last handle closes the connection and stops the driver.
//!
//! The driver never waits on the event consumer. When the event channel is
//! full the event is dropped and counted; the status watch always holds the
//! current state, and `close` completes whether or not events are read.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::application::ports::{
    ClientError, ClientEvent, Connector, FrameStream, ProtocolError, TransportError,
    TransportEvent,
};
use crate::domain::connection::{
    ConnectionMachine, ConnectionStatus, FailureOutcome, Generation, RetryPolicy,
};
use crate::domain::snapshot::SnapshotMessage;
use crate::infrastructure::codec::SnapshotCodec;
use crate::infrastructure::metrics;

/// Default capacity of the client event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// The driver task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client driver has stopped")]
pub struct ClientStopped;

#[derive(Debug)]
enum Command {
    Connect,
    Retry,
    Close(oneshot::Sender<()>),
}

// =============================================================================
// Handle
// =============================================================================

/// Control handle for a running client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ClientHandle {
    /// Close any existing connection and open a new one.
    ///
    /// # Errors
    ///
    /// Returns `ClientStopped` if the driver is gone.
    pub fn connect(&self) -> Result<(), ClientStopped> {
        self.commands
            .send(Command::Connect)
            .map_err(|_| ClientStopped)
    }

    /// Reset the attempt counter and reconnect.
    ///
    /// # Errors
    ///
    /// Returns `ClientStopped` if the driver is gone.
    pub fn retry(&self) -> Result<(), ClientStopped> {
        self.commands.send(Command::Retry).map_err(|_| ClientStopped)
    }

    /// Close the connection and cancel any pending retry.
    ///
    /// Resolves once the driver has torn everything down. Calling it again,
    /// or after the driver stopped, returns immediately.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// A receiver notified on every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

// =============================================================================
// Driver
// =============================================================================

type PendingConnect = BoxFuture<'static, Result<Box<dyn FrameStream>, TransportError>>;

enum Step {
    Command(Option<Command>),
    Opened(Generation, Result<Box<dyn FrameStream>, TransportError>),
    Frame(Generation, TransportEvent),
    RetryDue(Generation),
}

/// Reconnecting consumer-side client.
pub struct ReconnectingClient {
    connector: Arc<dyn Connector>,
    codec: SnapshotCodec,
    machine: ConnectionMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ClientEvent>,
    status: watch::Sender<ConnectionStatus>,
    pending: Option<(Generation, PendingConnect)>,
    stream: Option<(Generation, Box<dyn FrameStream>)>,
    retry_at: Option<(Instant, Generation)>,
}

impl ReconnectingClient {
    /// Spawn a driver task and return its handle and event receiver.
    ///
    /// The client starts disconnected; call [`ClientHandle::connect`].
    #[must_use]
    pub fn spawn(
        connector: Arc<dyn Connector>,
        policy: RetryPolicy,
        event_capacity: usize,
    ) -> (ClientHandle, mpsc::Receiver<ClientEvent>) {
        let machine = ConnectionMachine::new(policy);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(machine.status());

        let client = Self {
            connector,
            codec: SnapshotCodec::new(),
            machine,
            commands: command_rx,
            events: event_tx,
            status: status_tx,
            pending: None,
            stream: None,
            retry_at: None,
        };
        tokio::spawn(client.run());

        (
            ClientHandle {
                commands: command_tx,
                status: status_rx,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                (generation, result) = wait_pending(&mut self.pending) => {
                    Step::Opened(generation, result)
                }
                (generation, event) = wait_frame(&mut self.stream) => {
                    Step::Frame(generation, event)
                }
                generation = wait_retry(self.retry_at) => Step::RetryDue(generation),
            };

            match step {
                Step::Command(Some(Command::Connect)) => self.start_attempt(false).await,
                Step::Command(Some(Command::Retry)) => {
                    metrics::record_reconnect(true);
                    self.start_attempt(true).await;
                }
                Step::Command(Some(Command::Close(ack))) => {
                    self.shutdown().await;
                    let _ = ack.send(());
                }
                Step::Command(None) => {
                    self.shutdown().await;
                    tracing::debug!("All client handles dropped, driver stopping");
                    return;
                }
                Step::Opened(generation, result) => {
                    self.pending = None;
                    self.on_opened(generation, result).await;
                }
                Step::Frame(generation, event) => self.on_frame(generation, event).await,
                Step::RetryDue(generation) => {
                    self.retry_at = None;
                    if self.machine.retry_due(generation) {
                        metrics::record_reconnect(false);
                        self.start_attempt(false).await;
                    }
                }
            }
        }
    }

    async fn start_attempt(&mut self, manual: bool) {
        let start = if manual {
            self.machine.manual_retry()
        } else {
            self.machine.begin_attempt()
        };
        self.retry_at = None;
        self.pending = None;
        let had_stream = self.close_transport().await;

        tracing::info!(
            generation = start.generation,
            attempts = self.machine.attempts(),
            manual,
            "Connecting to snapshot source"
        );

        let connector = Arc::clone(&self.connector);
        self.pending = Some((
            start.generation,
            Box::pin(async move { connector.connect().await }),
        ));
        self.publish();

        if had_stream {
            self.emit(ClientEvent::Close);
        }
    }

    async fn on_opened(
        &mut self,
        generation: Generation,
        result: Result<Box<dyn FrameStream>, TransportError>,
    ) {
        match result {
            Ok(mut stream) => {
                if self.machine.on_open(generation) {
                    tracing::info!(generation, "Connected to snapshot source");
                    self.stream = Some((generation, stream));
                    self.publish();
                    self.emit(ClientEvent::Open);
                } else {
                    stream.close().await;
                }
            }
            Err(e) => self.on_failure(generation, e),
        }
    }

    async fn on_frame(&mut self, generation: Generation, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => {
                let decoded = self.codec.decode(&text);
                self.deliver(decoded);
            }
            TransportEvent::Binary(bytes) => {
                let decoded = self.codec.decode_binary(&bytes);
                self.deliver(decoded);
            }
            TransportEvent::Closed => {
                self.close_transport().await;
                if self.machine.on_closed(generation) {
                    tracing::info!(generation, "Snapshot source closed the connection");
                    self.publish();
                }
                self.emit(ClientEvent::Close);
            }
            TransportEvent::Failed(e) => {
                self.close_transport().await;
                self.on_failure(generation, e);
                self.emit(ClientEvent::Close);
            }
        }
    }

    fn deliver(&self, decoded: Result<SnapshotMessage, ProtocolError>) {
        match decoded {
            Ok(message) => self.emit(ClientEvent::Message(message)),
            Err(e) => {
                tracing::debug!(error = %e, "Discarding malformed message");
                self.emit(ClientEvent::Error(ClientError::Protocol(e)));
            }
        }
    }

    fn on_failure(&mut self, generation: Generation, error: TransportError) {
        match self.machine.on_failure(generation, error.to_string()) {
            FailureOutcome::Retry {
                generation,
                attempt,
                delay,
            } => {
                tracing::warn!(
                    error = %error,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Connection failed, scheduling retry"
                );
                self.retry_at = Some((Instant::now() + delay, generation));
                self.publish();
                self.emit(ClientEvent::Error(ClientError::Transport(error)));
            }
            FailureOutcome::Exhausted => {
                let max = self.machine.policy().max_attempts;
                tracing::warn!(
                    error = %error,
                    max_attempts = max,
                    "Connection failed, retries exhausted"
                );
                self.publish();
                self.emit(ClientEvent::Error(ClientError::Transport(error)));
                self.emit(ClientEvent::Error(ClientError::Exhausted(max)));
            }
            FailureOutcome::Stale => {
                tracing::debug!(generation, error = %error, "Ignoring stale failure");
            }
        }
    }

    async fn shutdown(&mut self) {
        self.retry_at = None;
        self.pending = None;
        let had_stream = self.close_transport().await;
        if self.machine.close() {
            tracing::info!("Client closed");
            self.publish();
        }
        if had_stream {
            self.emit(ClientEvent::Close);
        }
    }

    /// Close the live transport, if any. Returns whether one was open.
    async fn close_transport(&mut self) -> bool {
        match self.stream.take() {
            Some((_, mut stream)) => {
                stream.close().await;
                true
            }
            None => false,
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.machine.status());
    }

    fn emit(&self, event: ClientEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                metrics::record_event_dropped();
                tracing::debug!(event = ?event, "Event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("Client event receiver dropped");
            }
        }
    }
}

async fn wait_pending(
    pending: &mut Option<(Generation, PendingConnect)>,
) -> (Generation, Result<Box<dyn FrameStream>, TransportError>) {
    match pending {
        Some((generation, connect)) => {
            let result = connect.as_mut().await;
            (*generation, result)
        }
        None => std::future::pending().await,
    }
}

async fn wait_frame(
    stream: &mut Option<(Generation, Box<dyn FrameStream>)>,
) -> (Generation, TransportEvent) {
    match stream {
        Some((generation, stream)) => {
            let event = stream.next_event().await;
            (*generation, event)
        }
        None => std::future::pending().await,
    }
}

async fn wait_retry(retry_at: Option<(Instant, Generation)>) -> Generation {
    match retry_at {
        Some((deadline, generation)) => {
            tokio::time::sleep_until(deadline).await;
            generation
        }
        None => std::future::pending().await,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::MockConnector;
    use crate::domain::connection::ConnectionState;

    struct ScriptedStream {
        frames: mpsc::UnboundedReceiver<TransportEvent>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FrameStream for ScriptedStream {
        async fn next_event(&mut self) -> TransportEvent {
            match self.frames.recv().await {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Feeds frames into one scripted connection.
    struct Remote {
        frames: mpsc::UnboundedSender<TransportEvent>,
        closed: Arc<AtomicBool>,
    }

    impl Remote {
        fn send(&self, event: TransportEvent) {
            self.frames.send(event).unwrap();
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    enum Script {
        Open(ScriptedStream),
        Fail(TransportError),
    }

    #[derive(Default)]
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<Script>>,
        calls: AtomicUsize,
        call_times: Mutex<Vec<Instant>>,
    }

    impl ScriptedConnector {
        fn open(&self) -> Remote {
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            self.scripts.lock().push_back(Script::Open(ScriptedStream {
                frames: rx,
                closed: Arc::clone(&closed),
            }));
            Remote { frames: tx, closed }
        }

        fn fail(&self) {
            self.scripts
                .lock()
                .push_back(Script::Fail(TransportError::Connect("refused".to_string())));
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_times.lock().push(Instant::now());
            match self.scripts.lock().pop_front() {
                Some(Script::Open(stream)) => Ok(Box::new(stream)),
                Some(Script::Fail(e)) => Err(e),
                None => Err(TransportError::Connect("no script".to_string())),
            }
        }
    }

    const SNAPSHOT: &str = r#"{"timestamp":1000000,"snapshot":{"0":{"symbol":1,"best_bid":10,"best_ask":11}}}"#;

    fn spawn_client(
        connector: &Arc<ScriptedConnector>,
        max_attempts: u32,
    ) -> (ClientHandle, mpsc::Receiver<ClientEvent>) {
        let connector: Arc<dyn Connector> = Arc::clone(connector) as Arc<dyn Connector>;
        ReconnectingClient::spawn(
            connector,
            RetryPolicy {
                max_attempts,
                delay: Duration::from_millis(2000),
            },
            64,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn connect_opens_and_delivers_messages() {
        let connector = Arc::new(ScriptedConnector::default());
        let remote = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));
        assert_eq!(handle.status().state, ConnectionState::Connected);

        remote.send(TransportEvent::Text(SNAPSHOT.to_string()));
        match events.recv().await {
            Some(ClientEvent::Message(msg)) => assert_eq!(msg.timestamp, 1_000_000),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_message_keeps_connection_up() {
        let connector = Arc::new(ScriptedConnector::default());
        let remote = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));

        remote.send(TransportEvent::Text("{not json".to_string()));
        remote.send(TransportEvent::Binary(vec![0xff, 0xfe]));
        remote.send(TransportEvent::Text(SNAPSHOT.to_string()));

        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Protocol(ProtocolError::Malformed(_))))
        ));
        assert_eq!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Protocol(ProtocolError::NotUtf8)))
        );
        assert!(matches!(events.recv().await, Some(ClientEvent::Message(_))));
        assert_eq!(handle.status().state, ConnectionState::Connected);
        assert!(!remote.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_cap_reaches_terminal_state() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail();
        connector.fail();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Transport(_)))
        ));
        assert_eq!(handle.status().state, ConnectionState::Error);
        assert_eq!(handle.status().attempts, 1);

        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Transport(_)))
        ));
        assert_eq!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Exhausted(1)))
        );

        let status = handle.status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.exhausted);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_fixed_delay() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail();
        let _remote = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert!(matches!(events.recv().await, Some(ClientEvent::Error(_))));
        assert_eq!(events.recv().await, Some(ClientEvent::Open));

        let times = connector.call_times.lock().clone();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - times[0], Duration::from_millis(2000));
        assert_eq!(handle.status().attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn normal_close_does_not_retry() {
        let connector = Arc::new(ScriptedConnector::default());
        let remote = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));

        remote.send(TransportEvent::Closed);
        assert_eq!(events.recv().await, Some(ClientEvent::Close));
        assert_eq!(handle.status().state, ConnectionState::Disconnected);
        assert!(!handle.status().exhausted);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abnormal_close_schedules_retry() {
        let connector = Arc::new(ScriptedConnector::default());
        let first = connector.open();
        let _second = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));

        first.send(TransportEvent::Failed(TransportError::AbnormalClose {
            code: 1011,
            reason: "upstream unavailable".to_string(),
        }));
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Transport(
                TransportError::AbnormalClose { code: 1011, .. }
            )))
        ));
        assert_eq!(events.recv().await, Some(ClientEvent::Close));
        assert!(first.is_closed());

        assert_eq!(events.recv().await, Some(ClientEvent::Open));
        assert_eq!(connector.calls(), 2);
        assert_eq!(handle.status().state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_retry() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail();
        let (handle, mut events) = spawn_client(&connector, 3);

        handle.connect().unwrap();
        assert!(matches!(events.recv().await, Some(ClientEvent::Error(_))));

        handle.close().await;
        handle.close().await;
        assert_eq!(handle.status().state, ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_closes_previous_connection() {
        let connector = Arc::new(ScriptedConnector::default());
        let first = connector.open();
        let _second = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Close));
        assert!(first.is_closed());
        assert_eq!(events.recv().await, Some(ClientEvent::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_retry_after_exhaustion() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail();
        connector.fail();
        let _remote = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        for _ in 0..3 {
            assert!(matches!(events.recv().await, Some(ClientEvent::Error(_))));
        }
        assert!(handle.status().exhausted);

        handle.retry().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));
        let status = handle.status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.attempts, 0);
        assert!(!status.exhausted);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handles_closes_transport() {
        let connector = Arc::new(ScriptedConnector::default());
        let remote = connector.open();
        let (handle, mut events) = spawn_client(&connector, 1);

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));

        drop(handle);
        assert_eq!(events.recv().await, Some(ClientEvent::Close));
        assert_eq!(events.recv().await, None);
        assert!(remote.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn close_completes_while_consumer_is_not_reading() {
        let connector = Arc::new(ScriptedConnector::default());
        let remote = connector.open();
        let connector_dyn: Arc<dyn Connector> = Arc::clone(&connector) as Arc<dyn Connector>;
        let (handle, mut events) = ReconnectingClient::spawn(
            connector_dyn,
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::from_millis(2000),
            },
            1,
        );

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));

        for _ in 0..4 {
            remote.send(TransportEvent::Text(SNAPSHOT.to_string()));
        }
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(30), handle.close())
            .await
            .expect("close should not wait on the event consumer");
        assert!(remote.is_closed());
        assert_eq!(handle.status().state, ConnectionState::Disconnected);

        // At most one buffered event survives; the rest were dropped.
        let mut buffered = 0;
        while events.try_recv().is_ok() {
            buffered += 1;
        }
        assert!(buffered <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handles_while_consumer_is_not_reading() {
        let connector = Arc::new(ScriptedConnector::default());
        let remote = connector.open();
        let connector_dyn: Arc<dyn Connector> = Arc::clone(&connector) as Arc<dyn Connector>;
        let (handle, mut events) = ReconnectingClient::spawn(
            connector_dyn,
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::from_millis(2000),
            },
            1,
        );

        handle.connect().unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));
        for _ in 0..4 {
            remote.send(TransportEvent::Text(SNAPSHOT.to_string()));
        }
        tokio::task::yield_now().await;
        drop(handle);

        tokio::time::timeout(Duration::from_secs(30), async {
            while !remote.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("driver should stop after the last handle is dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempt_emits_no_close() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail();
        let (handle, mut events) = spawn_client(&connector, 3);

        handle.connect().unwrap();
        assert!(matches!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Transport(_)))
        ));
        handle.close().await;

        assert!(events.try_recv().is_err());
        assert_eq!(handle.status().state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_exhausts_on_first_failure() {
        let mut mock = MockConnector::new();
        mock.expect_connect()
            .returning(|| Err(TransportError::Timeout(Duration::from_secs(5))));

        let (handle, mut events) = ReconnectingClient::spawn(
            Arc::new(mock),
            RetryPolicy {
                max_attempts: 0,
                delay: Duration::from_millis(2000),
            },
            8,
        );

        handle.connect().unwrap();
        assert_eq!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Transport(
                TransportError::Timeout(Duration::from_secs(5))
            )))
        );
        assert_eq!(
            events.recv().await,
            Some(ClientEvent::Error(ClientError::Exhausted(0)))
        );
        assert!(handle.status().exhausted);
    }
}
