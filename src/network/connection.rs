//! WebSocket Connection
//!
//! Write half of one client socket. Every write goes through the
//! connection's own mutex so frames from concurrent broadcasts never
//! interleave.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use super::protocol::Payload;
use super::telemetry::Telemetry;

/// Reason sent with the close frame on server-side close.
pub const CLOSE_REASON: &str = "Connection was commanded to close";

/// Type-erased WebSocket sink.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// The write did not complete within the write timeout.
    #[error("write timed out")]
    Timeout,

    /// Transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

/// Serialized write access to one client.
pub struct Connection {
    sink: Mutex<Option<WsSink>>,
    closed: AtomicBool,
    write_timeout: Duration,
    telemetry: Arc<Telemetry>,
}

impl Connection {
    /// Wrap the write half of a socket.
    pub fn new<S>(sink: S, write_timeout: Duration, telemetry: Arc<Telemetry>) -> Self
    where
        S: Sink<Message, Error = WsError> + Send + 'static,
    {
        Self {
            sink: Mutex::new(Some(Box::pin(sink))),
            closed: AtomicBool::new(false),
            write_timeout,
            telemetry,
        }
    }

    /// Send a pre-encoded message as one text frame.
    pub async fn send(&self, payload: &Payload) -> Result<(), ConnectionError> {
        let result = self.write(Message::Text(payload.as_str().to_string())).await;
        match result {
            Ok(()) => self.telemetry.message_sent(payload.kind(), payload.len()).await,
            Err(_) => self.telemetry.send_failed(payload.kind()).await,
        }
        result
    }

    /// Send a protocol-level ping.
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.write(Message::Ping(Vec::new())).await
    }

    /// Close the socket. Only the first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut guard = self.sink.lock().await;
        if let Some(mut sink) = guard.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: CLOSE_REASON.into(),
            };
            // Best effort: the peer may already be gone.
            match timeout(self.write_timeout, sink.send(Message::Close(Some(frame)))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Close frame not sent: {}", e),
                Err(_) => debug!("Close frame timed out"),
            }
            match timeout(self.write_timeout, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Socket close failed: {}", e),
                Err(_) => debug!("Socket close timed out"),
            }
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn write(&self, message: Message) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ConnectionError::Closed)?;

        match timeout(self.write_timeout, sink.send(message)).await {
            Ok(result) => result.map_err(ConnectionError::from),
            Err(_) => Err(ConnectionError::Timeout),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .finish()
    }
}
