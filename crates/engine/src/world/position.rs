use super::WorldId;

/// Absolute entity position inside one world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub world: WorldId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub const fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self { world, x, y, z }
    }

    pub fn same_world(&self, other: &Location) -> bool {
        self.world == other.world
    }

    /// Squared euclidean distance. Ignores the world; callers check
    /// [`same_world`](Self::same_world) first.
    pub fn distance_squared(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// True if `other` is in the same world and no further than `radius`
    /// blocks away.
    pub fn within(&self, other: &Location, radius: f64) -> bool {
        self.same_world(other) && self.distance_squared(other) <= radius * radius
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new(WorldId::OVERWORLD, 0.0, 0.0, 0.0)
    }
}
