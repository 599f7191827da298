//! # MMO Relay Server
//!
//! Real-time session relay for a browser-based multiplayer 3D game.
//! Clients create and join short-coded sessions; the relay forwards
//! presence updates to nearby players and sounds to the session.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MMO RELAY                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Shared primitives                        │
//! │  ├── ids.rs       - Player IDs and session codes             │
//! │  └── math.rs      - Position and yaw                         │
//! │                                                              │
//! │  game/            - Shared state                             │
//! │  ├── player.rs    - Connected player and presence            │
//! │  ├── session.rs   - Membership, start flag, fan-out          │
//! │  ├── spatial.rs   - Area-of-interest grid                    │
//! │  └── registry.rs  - Lobby and session table                  │
//! │                                                              │
//! │  network/         - Transport                                │
//! │  ├── server.rs    - Accept loop, sweeper, health task        │
//! │  ├── supervisor.rs- Per-connection read loop                 │
//! │  ├── dispatch.rs  - Message routing                          │
//! │  ├── connection.rs- Serialized socket writes                 │
//! │  ├── protocol.rs  - JSON message types                       │
//! │  ├── telemetry.rs - Counters and histograms                  │
//! │  └── health.rs    - /health and /metrics                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! Messages sent one after another to the same client arrive in that
//! order. There is no ordering across different senders and no sequence
//! numbers; clients render whatever they receive last.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::{PlayerId, SessionId, Vec3, Yaw};
pub use game::{Registry, SessionConfig, SoundPolicy, SpatialConfig, AoiShape};
pub use network::{LivenessConfig, RelayServer, ServerConfig, ServerError, ShutdownHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
