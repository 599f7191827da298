//! Core primitives.
//!
//! Identifiers and the small math types shared by the game and network
//! layers. Nothing here touches locks or sockets.

pub mod ids;
pub mod math;

// Re-export core types
pub use ids::{PlayerId, SessionId};
pub use math::{Vec3, Yaw};
