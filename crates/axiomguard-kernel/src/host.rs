//! The simulation as seen by the corrector.

use serde::{Deserialize, Serialize};

/// A live entity's correctable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub max_hp: f64,
    /// Persistent entities survive spatial culling.
    pub persistent: bool,
}

impl EntityState {
    #[must_use]
    pub fn new(id: u64, x: f64, y: f64, hp: f64, max_hp: f64) -> Self {
        Self {
            id,
            x,
            y,
            hp,
            max_hp,
            persistent: false,
        }
    }

    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Outbound surface the corrector acts on. The simulation implements this;
/// it never learns why a command was issued.
pub trait SimulationHost {
    /// Force a full spatial-index rebuild.
    fn rebuild_spatial_index(&mut self);

    fn player_position(&self) -> (f64, f64);

    fn entities_mut(&mut self) -> &mut Vec<EntityState>;

    /// Scale world-generation entropy by `1 - fraction`. Returns the new value.
    fn reduce_world_entropy(&mut self, fraction: f64) -> f64;

    fn set_inventory_locked(&mut self, locked: bool);

    fn inventory_locked(&self) -> bool;
}

/// In-memory host for tests and the harness.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxWorld {
    pub player: (f64, f64),
    pub entities: Vec<EntityState>,
    pub world_entropy: f64,
    pub inventory_locked: bool,
    pub spatial_rebuilds: u32,
}

impl SandboxWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            player: (0.0, 0.0),
            entities: Vec::new(),
            world_entropy: 1.0,
            inventory_locked: false,
            spatial_rebuilds: 0,
        }
    }

    #[must_use]
    pub fn with_entities(mut self, entities: Vec<EntityState>) -> Self {
        self.entities = entities;
        self
    }
}

impl Default for SandboxWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationHost for SandboxWorld {
    fn rebuild_spatial_index(&mut self) {
        self.spatial_rebuilds += 1;
    }

    fn player_position(&self) -> (f64, f64) {
        self.player
    }

    fn entities_mut(&mut self) -> &mut Vec<EntityState> {
        &mut self.entities
    }

    fn reduce_world_entropy(&mut self, fraction: f64) -> f64 {
        self.world_entropy *= 1.0 - fraction.clamp(0.0, 1.0);
        self.world_entropy
    }

    fn set_inventory_locked(&mut self, locked: bool) {
        self.inventory_locked = locked;
    }

    fn inventory_locked(&self) -> bool {
        self.inventory_locked
    }
}
