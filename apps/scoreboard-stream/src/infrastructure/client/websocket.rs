//! WebSocket Connector
//!
//! [`Connector`] implementation over `tokio-tungstenite`. Control frames are
//! handled inside the stream; only data frames and the close outcome reach
//! the reconnecting client.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Connector, FrameStream, TransportError, TransportEvent};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away, e.g. a server shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Default timeout for opening a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether `code` ends a connection without an error.
#[must_use]
pub const fn is_normal_close(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
}

/// Map a received close frame to a transport event.
///
/// A close frame without a status code counts as normal.
#[must_use]
pub fn classify_close(frame: Option<&CloseFrame>) -> TransportEvent {
    match frame {
        None => TransportEvent::Closed,
        Some(frame) => {
            let code = u16::from(frame.code);
            if is_normal_close(code) {
                TransportEvent::Closed
            } else {
                TransportEvent::Failed(TransportError::AbnormalClose {
                    code,
                    reason: frame.reason.as_str().to_owned(),
                })
            }
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Opens WebSocket connections to a fixed URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector for `url` with the default timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the open timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
        tracing::debug!(url = %self.url, "Opening WebSocket");

        let (ws, _response) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.connect_timeout))?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(WsFrameStream::new(ws)))
    }
}

// =============================================================================
// Frame Stream
// =============================================================================

/// An open WebSocket connection.
pub struct WsFrameStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WsFrameStream {
    const fn new(inner: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return TransportEvent::Text(text.as_str().to_owned());
                }
                Some(Ok(Message::Binary(data))) => return TransportEvent::Binary(data.to_vec()),
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    return classify_close(frame.as_ref());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    self.closed = true;
                    return TransportEvent::Failed(TransportError::Read(e.to_string()));
                }
                None => {
                    self.closed = true;
                    return TransportEvent::Failed(TransportError::Dropped);
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close(None).await {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test_case(1000, true ; "normal")]
    #[test_case(1001, true ; "going away")]
    #[test_case(1006, false ; "abnormal")]
    #[test_case(1011, false ; "internal error")]
    #[test_case(4000, false ; "application code")]
    fn normal_close_codes(code: u16, normal: bool) {
        assert_eq!(is_normal_close(code), normal);
    }

    #[test]
    fn close_without_frame_is_normal() {
        assert_eq!(classify_close(None), TransportEvent::Closed);
    }

    #[test]
    fn abnormal_close_carries_code_and_reason() {
        let frame = CloseFrame {
            code: CloseCode::Error,
            reason: "upstream unavailable".into(),
        };
        assert_eq!(
            classify_close(Some(&frame)),
            TransportEvent::Failed(TransportError::AbnormalClose {
                code: 1011,
                reason: "upstream unavailable".to_string(),
            })
        );
    }

    #[test]
    fn connector_defaults() {
        let connector = WsConnector::new("ws://localhost:3000/api/socket")
            .with_connect_timeout(Duration::from_millis(250));
        assert_eq!(connector.url(), "ws://localhost:3000/api/socket");
        assert_eq!(connector.connect_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = match WsConnector::new(format!("ws://{addr}/")).connect().await {
            Err(e) => e,
            Ok(_) => panic!("connect should fail"),
        };
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
