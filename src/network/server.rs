//! WebSocket Relay Server
//!
//! Accepts WebSocket connections, gives each one a player and a read loop,
//! sweeps empty sessions in the background and serves the health side
//! channel on a second port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::PlayerId;
use crate::game::{Player, Registry, SessionConfig};
use crate::network::connection::Connection;
use crate::network::dispatch::Dispatcher;
use crate::network::health;
use crate::network::supervisor::{handle_disconnect, supervise, LivenessConfig};
use crate::network::telemetry::Telemetry;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket bind address.
    pub bind_addr: SocketAddr,
    /// Health/metrics bind address. `None` disables the side channel.
    pub health_addr: Option<SocketAddr>,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Read deadline and ping cadence.
    pub liveness: LivenessConfig,
    /// How often empty sessions are swept.
    pub cleanup_interval: Duration,
    /// Per-session tuning.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5500)),
            health_addr: Some(SocketAddr::from(([0, 0, 0, 0], 5501))),
            max_connections: 1000,
            liveness: LivenessConfig::default(),
            cleanup_interval: Duration::from_secs(5 * 60),
            session: SessionConfig::default(),
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// I/O error on a bound listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    listener: TcpListener,
    health_listener: Option<TcpListener>,
    dispatcher: Dispatcher,
    telemetry: Arc<Telemetry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Bind the listeners. Nothing is accepted until `run`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = bind(config.bind_addr).await?;
        let health_listener = match config.health_addr {
            Some(addr) => Some(bind(addr).await?),
            None => None,
        };

        let telemetry = Arc::new(Telemetry::new());
        let registry = Arc::new(Registry::new(config.session, telemetry.clone()));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            listener,
            health_listener,
            dispatcher: Dispatcher::new(registry),
            telemetry,
            shutdown_tx,
        })
    }

    /// Address the WebSocket listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Address the health listener is bound to, if enabled.
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health_listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }

    /// Handle for stopping the server from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run until shutdown.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(mut self) -> Result<(), ServerError> {
        info!("Relay listening on {}", self.local_addr()?);

        let cleanup_handle = tokio::spawn(run_cleanup_loop(
            self.registry().clone(),
            self.config.cleanup_interval,
            self.shutdown_tx.subscribe(),
        ));

        let health_handle = self.health_listener.take().map(|listener| {
            let app = health::router(self.dispatcher.registry().clone());
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            if let Ok(addr) = listener.local_addr() {
                info!("Health endpoint on http://{}/health", addr);
            }
            tokio::spawn(async move {
                let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                });
                if let Err(e) = serve.await {
                    error!("Health server error: {}", e);
                }
            })
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let active = self.telemetry.active_connections();
                            if active >= self.config.max_connections as i64 {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        if let Some(handle) = health_handle {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Handle a new TCP connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let dispatcher = self.dispatcher.clone();
        let telemetry = self.telemetry.clone();
        let liveness = self.config.liveness;
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {}: {}", addr, e);
                    telemetry.connection_error();
                    return;
                }
            };
            telemetry.connection_opened();

            let (sink, stream) = ws_stream.split();
            let player = Arc::new(Player::new(
                PlayerId::generate(),
                Connection::new(sink, liveness.read_timeout, telemetry.clone()),
            ));
            info!(player = %player.id(), "Player connected from {}", addr);

            dispatcher.registry().add_lobby_player(player.clone()).await;
            run_player(dispatcher, player, stream, liveness, shutdown_rx).await;

            telemetry.connection_closed();
        });
    }
}

/// Supervise `player` on its own task. If that task panics, the player is
/// still torn down.
async fn run_player<S>(
    dispatcher: Dispatcher,
    player: Arc<Player>,
    inbound: S,
    liveness: LivenessConfig,
    shutdown_rx: broadcast::Receiver<()>,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    let task = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let player = player.clone();
        async move { supervise(&dispatcher, player, inbound, liveness, shutdown_rx).await }
    });

    if let Err(e) = task.await {
        error!(player = %player.id(), "Connection task failed: {}", e);
        dispatcher.registry().telemetry().connection_error();
        handle_disconnect(dispatcher.registry(), &player).await;
    }
}

/// Stops a running server.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Signal shutdown. The accept loop, the sweeper, the health server
    /// and every read loop stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::BindFailed { addr, source })
}

/// Sweep empty sessions every `period`.
async fn run_cleanup_loop(
    registry: Arc<Registry>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = registry.sweep_empty_sessions().await;
                let (players, sessions) = registry.counts().await;
                debug!(removed, players, sessions, "Cleanup sweep");
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}
