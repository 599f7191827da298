//! Network Layer
//!
//! WebSocket transport, wire protocol, per-connection read loops and the
//! HTTP health side channel. All shared state lives in `game/`.

pub mod connection;
pub mod dispatch;
pub mod health;
pub mod protocol;
pub mod server;
pub mod supervisor;
pub mod telemetry;

pub use connection::{Connection, ConnectionError};
pub use dispatch::Dispatcher;
pub use protocol::{ClientMessage, Payload, PlayerInfo, ServerMessage, SessionInfo};
pub use server::{RelayServer, ServerConfig, ServerError, ShutdownHandle};
pub use supervisor::{ExitReason, LivenessConfig};
pub use telemetry::Telemetry;
