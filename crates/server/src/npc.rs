//! The player-like NPC entity whose client-side representation is tracked.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

use skintrack_engine::world::position::Location;
use uuid::Uuid;

use crate::skin::SkinRecord;

/// Entity ids count down from -1000 so they never collide with ids handed
/// out to real connections.
static NEXT_ENTITY_ID: AtomicI32 = AtomicI32::new(-1000);

fn next_entity_id() -> i32 {
    NEXT_ENTITY_ID.fetch_sub(1, Ordering::Relaxed)
}

/// Deterministic uuid so an NPC keeps its identity across restarts.
pub fn npc_uuid(npc_id: u32) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, format!("npc:{}", npc_id).as_bytes())
}

/// A fake player. Shared between the NPC registry, its tracker and the
/// transport (which reads the applied skin when encoding packets).
#[derive(Debug)]
pub struct FakePlayer {
    pub npc_id: u32,
    pub uuid: Uuid,
    pub entity_id: i32,
    pub name: String,
    skin_name: RwLock<String>,
    location: RwLock<Location>,
    remove_from_player_list: RwLock<Option<bool>>,
    /// Skin currently applied to the client-visible profile.
    profile_skin: RwLock<Option<Arc<SkinRecord>>>,
}

impl FakePlayer {
    pub fn new(npc_id: u32, name: impl Into<String>, location: Location) -> Self {
        let name = name.into();
        Self {
            npc_id,
            uuid: npc_uuid(npc_id),
            entity_id: next_entity_id(),
            skin_name: RwLock::new(name.clone()),
            name,
            location: RwLock::new(location),
            remove_from_player_list: RwLock::new(None),
            profile_skin: RwLock::new(None),
        }
    }

    /// Name the skin is resolved from. Defaults to the NPC name.
    pub fn skin_name(&self) -> String {
        self.skin_name.read().expect("npc poisoned").clone()
    }

    pub fn set_skin_name(&self, skin_name: impl Into<String>) {
        *self.skin_name.write().expect("npc poisoned") = skin_name.into();
    }

    /// Last known location.
    pub fn location(&self) -> Location {
        *self.location.read().expect("npc poisoned")
    }

    pub fn set_location(&self, location: Location) {
        *self.location.write().expect("npc poisoned") = location;
    }

    /// Per-NPC override of the global player-list removal default.
    pub fn remove_from_player_list(&self) -> Option<bool> {
        *self.remove_from_player_list.read().expect("npc poisoned")
    }

    pub fn set_remove_from_player_list(&self, value: Option<bool>) {
        *self.remove_from_player_list.write().expect("npc poisoned") = value;
    }

    /// Apply `skin` to the profile sent in player-info packets.
    pub fn apply_skin(&self, skin: &Arc<SkinRecord>) {
        *self.profile_skin.write().expect("npc poisoned") = Some(Arc::clone(skin));
    }

    pub fn applied_skin(&self) -> Option<Arc<SkinRecord>> {
        self.profile_skin.read().expect("npc poisoned").clone()
    }
}
