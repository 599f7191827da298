//! Presence Math Types
//!
//! World-space types carried by `update` frames. Values are whatever the
//! browser reports; the relay never transforms them.

use serde::{Deserialize, Serialize};

/// World-space position. Y is height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// East/west.
    #[serde(default)]
    pub x: f64,
    /// Height.
    #[serde(default)]
    pub y: f64,
    /// North/south.
    #[serde(default)]
    pub z: f64,
}

impl Vec3 {
    /// Create a new position.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared distance on the horizontal (XZ) plane.
    #[inline]
    pub fn horizontal_distance_sq(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }
}

/// Rotation around the vertical axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Yaw {
    /// Radians.
    #[serde(default)]
    pub y: f64,
}

impl Yaw {
    /// Create a new rotation.
    pub const fn new(y: f64) -> Self {
        Self { y }
    }
}
