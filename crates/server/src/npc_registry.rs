//! Live NPCs and their visibility trackers.
//!
//! The registry is the entity-lifecycle side of the protocol: spawn builds a
//! tracker and runs a first nearby sweep, despawn latches the tracker, and
//! skin changes go through the tracker so viewers reload the texture.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use skintrack_engine::world::position::Location;

use crate::npc::FakePlayer;
use crate::player_registry::PlayerInfo;
use crate::visibility::{EntityVisibilityTracker, SyncContext};

struct NpcEntry {
    entity: Arc<FakePlayer>,
    tracker: Arc<EntityVisibilityTracker>,
}

pub struct NpcRegistry {
    ctx: Arc<SyncContext>,
    npcs: RwLock<IndexMap<u32, NpcEntry>>,
    nearby_radius: f64,
}

impl NpcRegistry {
    pub fn new(ctx: Arc<SyncContext>, nearby_radius: f64) -> Self {
        Self {
            ctx,
            npcs: RwLock::new(IndexMap::new()),
            nearby_radius,
        }
    }

    /// Spawn an NPC. An existing NPC with the same id is despawned first.
    pub fn spawn(&self, npc_id: u32, name: &str, location: Location) -> Arc<FakePlayer> {
        if self.despawn(npc_id) {
            tracing::info!("NPC #{} respawned", npc_id);
        }

        let entity = Arc::new(FakePlayer::new(npc_id, name, location));
        self.ctx
            .players
            .register(PlayerInfo::fake(entity.uuid, name, location));

        let tracker = Arc::new(EntityVisibilityTracker::new(Arc::clone(&entity), &self.ctx));
        entity.apply_skin(&tracker.skin());

        self.npcs.write().expect("npc registry poisoned").insert(
            npc_id,
            NpcEntry {
                entity: Arc::clone(&entity),
                tracker: Arc::clone(&tracker),
            },
        );
        tracing::info!(
            "NPC #{} '{}' spawned in {} at ({:.1}, {:.1}, {:.1})",
            npc_id,
            name,
            location.world,
            location.x,
            location.y,
            location.z
        );

        tracker.update_nearby_viewers(self.nearby_radius);
        entity
    }

    /// Remove an NPC from the world. Returns `false` if it was not spawned.
    pub fn despawn(&self, npc_id: u32) -> bool {
        let entry = self
            .npcs
            .write()
            .expect("npc registry poisoned")
            .shift_remove(&npc_id);
        let Some(entry) = entry else {
            return false;
        };
        entry.tracker.on_entity_removed();
        self.ctx.players.deregister(entry.entity.uuid);
        true
    }

    /// Change the skin an NPC resolves and push it to viewers.
    pub fn set_skin(&self, npc_id: u32, skin_name: &str) -> bool {
        let Some((entity, tracker)) = self.lookup(npc_id) else {
            return false;
        };
        entity.set_skin_name(skin_name);
        tracker.apply_skin_change();
        true
    }

    pub fn move_to(&self, npc_id: u32, location: Location) -> bool {
        let Some((entity, _)) = self.lookup(npc_id) else {
            return false;
        };
        entity.set_location(location);
        self.ctx.players.update_location(entity.uuid, location);
        true
    }

    /// Set or clear the NPC's own player-list removal setting.
    pub fn set_remove_from_player_list(&self, npc_id: u32, value: Option<bool>) -> bool {
        let Some((entity, _)) = self.lookup(npc_id) else {
            return false;
        };
        entity.set_remove_from_player_list(value);
        true
    }

    /// Run the nearby-viewer sweep for every NPC. Returns the number of
    /// (npc, viewer) pairs visited.
    pub fn sweep(&self) -> usize {
        let trackers: Vec<Arc<EntityVisibilityTracker>> = self
            .npcs
            .read()
            .expect("npc registry poisoned")
            .values()
            .map(|entry| Arc::clone(&entry.tracker))
            .collect();
        trackers
            .iter()
            .map(|tracker| tracker.update_nearby_viewers(self.nearby_radius))
            .sum()
    }

    pub fn get(&self, npc_id: u32) -> Option<Arc<FakePlayer>> {
        self.lookup(npc_id).map(|(entity, _)| entity)
    }

    pub fn tracker(&self, npc_id: u32) -> Option<Arc<EntityVisibilityTracker>> {
        self.lookup(npc_id).map(|(_, tracker)| tracker)
    }

    pub fn len(&self) -> usize {
        self.npcs.read().expect("npc registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, npc_id: u32) -> Option<(Arc<FakePlayer>, Arc<EntityVisibilityTracker>)> {
        self.npcs
            .read()
            .expect("npc registry poisoned")
            .get(&npc_id)
            .map(|entry| (Arc::clone(&entry.entity), Arc::clone(&entry.tracker)))
    }
}
