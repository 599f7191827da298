//! Spatial Index
//!
//! Uniform grid over the horizontal (XZ) plane used to decide which session
//! members receive a presence update. Each session owns one grid.
//!
//! The default area of interest is the square block of cells around the
//! player, so players near a corner of the block may be included even if
//! they are slightly further than the view distance. `AoiShape::Circle`
//! filters those out.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::core::{PlayerId, Vec3};

/// Grid cell coordinate.
pub type CellKey = (i64, i64);

/// Largest neighbourhood scanned in each direction, in cells.
pub const MAX_CELL_RADIUS: i64 = 32;

/// Area-of-interest shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AoiShape {
    /// Every player in the surrounding block of cells.
    #[default]
    Square,
    /// Block of cells, then filtered by true horizontal distance.
    Circle,
}

/// Grid tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialConfig {
    /// Cell edge length in world units.
    pub cell_size: f64,
    /// Radius of interest in world units.
    pub view_distance: f64,
    /// Area-of-interest shape.
    pub shape: AoiShape,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            cell_size: 50.0,
            view_distance: 100.0,
            shape: AoiShape::Square,
        }
    }
}

impl SpatialConfig {
    /// Number of cells to scan in each direction, at most
    /// `MAX_CELL_RADIUS`.
    pub fn cell_radius(&self) -> i64 {
        let radius = (self.view_distance / self.cell_size).ceil();
        if radius.is_nan() {
            return 0;
        }
        (radius as i64).clamp(0, MAX_CELL_RADIUS)
    }

    /// Cell containing `position`. Height is ignored; coordinates beyond the
    /// `i64` range land in the edge cells.
    pub fn cell_of(&self, position: &Vec3) -> CellKey {
        (
            (position.x / self.cell_size).floor() as i64,
            (position.z / self.cell_size).floor() as i64,
        )
    }
}

#[derive(Debug, Default)]
struct GridState {
    /// Occupants per cell. Empty cells are removed.
    cells: HashMap<CellKey, HashSet<PlayerId>>,
    /// Inverse map: each tracked player's cell and last position.
    players: HashMap<PlayerId, (CellKey, Vec3)>,
}

/// Per-session spatial index.
#[derive(Debug)]
pub struct SpatialGrid {
    config: SpatialConfig,
    state: RwLock<GridState>,
}

impl SpatialGrid {
    /// Create an empty grid.
    pub fn new(config: SpatialConfig) -> Self {
        Self {
            config,
            state: RwLock::new(GridState::default()),
        }
    }

    /// Grid tuning.
    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Track `id` at `position`, moving it between cells if needed.
    pub async fn update_player_position(&self, id: &PlayerId, position: Vec3) {
        let cell = self.config.cell_of(&position);
        let mut state = self.state.write().await;

        let previous = state.players.get(id).map(|(c, _)| *c);
        if let Some(old) = previous {
            if old != cell {
                Self::leave_cell(&mut state.cells, old, id);
                state.cells.entry(cell).or_default().insert(id.clone());
            }
        } else {
            state.cells.entry(cell).or_default().insert(id.clone());
        }

        state.players.insert(id.clone(), (cell, position));
    }

    /// Players within the area of interest of `id`, excluding `id`.
    ///
    /// Empty if `id` is not tracked.
    pub async fn nearby_players(&self, id: &PlayerId) -> Vec<PlayerId> {
        let state = self.state.read().await;
        let Some(&((cx, cz), origin)) = state.players.get(id) else {
            return Vec::new();
        };

        let radius = self.config.cell_radius();
        let max_dist_sq = self.config.view_distance * self.config.view_distance;
        let mut nearby = Vec::new();

        for x in cx.saturating_sub(radius)..=cx.saturating_add(radius) {
            for z in cz.saturating_sub(radius)..=cz.saturating_add(radius) {
                let Some(occupants) = state.cells.get(&(x, z)) else {
                    continue;
                };
                for other in occupants {
                    if other == id {
                        continue;
                    }
                    if self.config.shape == AoiShape::Circle {
                        let within = state
                            .players
                            .get(other)
                            .is_some_and(|(_, pos)| origin.horizontal_distance_sq(pos) <= max_dist_sq);
                        if !within {
                            continue;
                        }
                    }
                    nearby.push(other.clone());
                }
            }
        }

        nearby
    }

    /// Stop tracking `id`. No-op if absent.
    pub async fn remove_player(&self, id: &PlayerId) {
        let mut state = self.state.write().await;
        if let Some((cell, _)) = state.players.remove(id) {
            Self::leave_cell(&mut state.cells, cell, id);
        }
    }

    /// Number of tracked players.
    pub async fn player_count(&self) -> usize {
        self.state.read().await.players.len()
    }

    /// Number of non-empty cells.
    pub async fn cell_count(&self) -> usize {
        self.state.read().await.cells.len()
    }

    fn leave_cell(cells: &mut HashMap<CellKey, HashSet<PlayerId>>, cell: CellKey, id: &PlayerId) {
        if let Some(occupants) = cells.get_mut(&cell) {
            occupants.remove(id);
            if occupants.is_empty() {
                cells.remove(&cell);
            }
        }
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}
