pub mod position;

use std::fmt;

/// Identifies a spatial partition (a loaded world / dimension).
///
/// Two locations are only comparable by distance when they share a
/// `WorldId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WorldId(pub u32);

impl WorldId {
    pub const OVERWORLD: WorldId = WorldId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world#{}", self.0)
    }
}
