//! Connection Supervisor
//!
//! Read loop for one client. Waits on the next inbound frame, the ping
//! ticker, the read deadline and server shutdown at once; whichever fires
//! first decides what happens. When the loop ends, the disconnect handler
//! runs exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::game::{Player, Registry};
use crate::network::connection::ConnectionError;
use crate::network::dispatch::Dispatcher;
use crate::network::protocol::ClientMessage;

/// Telemetry label for frames that fail to decode.
const INVALID_KIND: &str = "invalid";

/// Liveness tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Close the connection if nothing arrives for this long.
    pub read_timeout: Duration,
    /// How often the server pings.
    pub ping_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Why a read loop ended.
#[derive(Debug)]
pub enum ExitReason {
    /// Peer sent a close frame.
    ClosedByPeer,
    /// Stream ended without a close frame.
    StreamEnded,
    /// No frame within the read timeout.
    TimedOut,
    /// Ping could not be written.
    PingFailed(ConnectionError),
    /// Read failed.
    ReadFailed(WsError),
    /// Server is shutting down.
    Shutdown,
}

impl ExitReason {
    /// Whether this is an ordinary end of a connection rather than a fault.
    pub fn is_expected(&self) -> bool {
        match self {
            ExitReason::ClosedByPeer | ExitReason::StreamEnded | ExitReason::Shutdown => true,
            ExitReason::ReadFailed(e) => is_expected_close(e),
            ExitReason::TimedOut | ExitReason::PingFailed(_) => false,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::ClosedByPeer => write!(f, "closed by peer"),
            ExitReason::StreamEnded => write!(f, "stream ended"),
            ExitReason::TimedOut => write!(f, "read timed out"),
            ExitReason::PingFailed(e) => write!(f, "ping failed: {}", e),
            ExitReason::ReadFailed(e) => write!(f, "read failed: {}", e),
            ExitReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

fn is_expected_close(error: &WsError) -> bool {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

/// Run the read loop for `player` until the connection ends, then clean up.
pub async fn supervise<S>(
    dispatcher: &Dispatcher,
    player: Arc<Player>,
    mut inbound: S,
    liveness: LivenessConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> ExitReason
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let deadline = sleep(liveness.read_timeout);
    tokio::pin!(deadline);

    let mut ping = interval_at(Instant::now() + liveness.ping_interval, liveness.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            frame = inbound.next() => {
                deadline.as_mut().reset(Instant::now() + liveness.read_timeout);
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(dispatcher, &player, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(player = %player.id(), len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) => break ExitReason::ClosedByPeer,
                    // Pongs only need to push the deadline forward.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break ExitReason::ReadFailed(e),
                    None => break ExitReason::StreamEnded,
                }
            }
            _ = ping.tick() => {
                if let Err(e) = player.connection().ping().await {
                    break ExitReason::PingFailed(e);
                }
            }
            _ = &mut deadline => break ExitReason::TimedOut,
            _ = shutdown.recv() => break ExitReason::Shutdown,
        }
    };

    if reason.is_expected() {
        debug!(player = %player.id(), "Connection ended: {}", reason);
    } else {
        warn!(player = %player.id(), "Connection ended: {}", reason);
        dispatcher.registry().telemetry().connection_error();
    }

    handle_disconnect(dispatcher.registry(), &player).await;
    reason
}

async fn handle_text(dispatcher: &Dispatcher, player: &Arc<Player>, text: &str) {
    let telemetry = dispatcher.registry().telemetry();
    let started = Instant::now();

    match ClientMessage::from_json(text) {
        Ok(message) => {
            let kind = message.kind();
            telemetry.message_received(kind, text.len()).await;
            dispatcher.dispatch(player, message).await;
            telemetry.record_processing(kind, started.elapsed()).await;
        }
        Err(e) => {
            telemetry.message_received(INVALID_KIND, text.len()).await;
            warn!(player = %player.id(), "Failed to decode message: {}", e);
        }
    }
}

/// Tear down everything a player owns. Returns false if another caller got
/// there first.
pub async fn handle_disconnect(registry: &Registry, player: &Arc<Player>) -> bool {
    if !player.mark_disconnected() {
        return false;
    }

    info!(player = %player.id(), "Player disconnected");
    player.connection().close().await;
    registry.disconnect(player).await;
    true
}
