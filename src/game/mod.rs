//! Game State Module
//!
//! Who is connected, which session they are in, and where they stand.
//! The relay never simulates anything; it only tracks presence and
//! decides who hears about it.
//!
//! ## Module Structure
//!
//! - `player`: Connected player and its presence state
//! - `session`: Session membership, start flag, broadcast fan-out
//! - `spatial`: Per-session grid for area-of-interest filtering
//! - `registry`: Lobby and session table

pub mod player;
pub mod registry;
pub mod session;
pub mod spatial;

// Re-export key types
pub use player::{Player, PlayerState};
pub use registry::{Registry, RegistryError};
pub use session::{Departure, Session, SessionConfig, SoundPolicy};
pub use spatial::{AoiShape, SpatialConfig, SpatialGrid, MAX_CELL_RADIUS};
