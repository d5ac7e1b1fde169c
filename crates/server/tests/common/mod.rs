//! Shared fixtures: a recording transport and a hand-driven scheduler.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use skintrack_engine::tick::TickScheduler;
use skintrack_engine::world::WorldId;
use skintrack_engine::world::position::Location;
use skintrack_server::npc::FakePlayer;
use skintrack_server::player_registry::{PlayerInfo, PlayerRegistry};
use skintrack_server::settings::Settings;
use skintrack_server::skin::{SkinCache, SkinRecord};
use skintrack_server::transport::PlayerListTransport;
use skintrack_server::visibility::{EntityVisibilityTracker, SyncContext};
use uuid::Uuid;

/// One packet emission as seen by the transport: (kind, viewer, entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Add { viewer: Uuid, entity: Uuid },
    Remove { viewer: Uuid, entity: Uuid },
    Respawn { viewer: Uuid, entity: Uuid },
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn adds_to(&self, viewer: Uuid) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Add { viewer: v, .. } if *v == viewer))
            .count()
    }

    pub fn removes_to(&self, viewer: Uuid) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Remove { viewer: v, .. } if *v == viewer))
            .count()
    }

    pub fn respawns_to(&self, viewer: Uuid) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Respawn { viewer: v, .. } if *v == viewer))
            .count()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl PlayerListTransport for RecordingTransport {
    fn send_add_to_list(&self, viewer: Uuid, entity: &FakePlayer) {
        self.sent.lock().unwrap().push(Sent::Add {
            viewer,
            entity: entity.uuid,
        });
    }

    fn send_remove_from_list(&self, viewer: Uuid, entity: &FakePlayer) {
        self.sent.lock().unwrap().push(Sent::Remove {
            viewer,
            entity: entity.uuid,
        });
    }

    fn respawn_for_viewer(&self, viewer: Uuid, entity: &FakePlayer) {
        self.sent.lock().unwrap().push(Sent::Respawn {
            viewer,
            entity: entity.uuid,
        });
    }
}

pub struct Harness {
    pub scheduler: Arc<TickScheduler>,
    pub transport: Arc<RecordingTransport>,
    pub players: Arc<PlayerRegistry>,
    pub skins: Arc<SkinCache>,
    pub ctx: Arc<SyncContext>,
}

/// Removal policy on, 2 retries, 1 tick delay.
pub fn harness() -> Harness {
    harness_with(Settings::default())
}

pub fn harness_with(settings: Settings) -> Harness {
    let scheduler = Arc::new(TickScheduler::new());
    let transport = Arc::new(RecordingTransport::default());
    let players = Arc::new(PlayerRegistry::new());
    let skins = Arc::new(SkinCache::new());
    let ctx = Arc::new(SyncContext::new(
        &settings,
        scheduler.clone(),
        transport.clone(),
        Arc::clone(&players),
        skins.clone(),
    ));
    Harness {
        scheduler,
        transport,
        players,
        skins,
        ctx,
    }
}

pub fn at(x: f64, z: f64) -> Location {
    Location::new(WorldId::OVERWORLD, x, 64.0, z)
}

impl Harness {
    /// A registered fake player with its tracker.
    pub fn npc(&self, npc_id: u32, name: &str, location: Location) -> (Arc<FakePlayer>, EntityVisibilityTracker) {
        let entity = Arc::new(FakePlayer::new(npc_id, name, location));
        self.players
            .register(PlayerInfo::fake(entity.uuid, name, location));
        let tracker = EntityVisibilityTracker::new(Arc::clone(&entity), &self.ctx);
        (entity, tracker)
    }

    /// A registered, connected real player.
    pub fn viewer(&self, name: &str, location: Location) -> PlayerInfo {
        let uuid = Uuid::new_v3(&Uuid::NAMESPACE_URL, format!("OfflinePlayer:{}", name).as_bytes());
        let info = PlayerInfo::new(uuid, name, location);
        self.players.register(info.clone());
        info
    }

    pub fn skin(&self, name: &str, texture: &str) -> SkinRecord {
        let record = SkinRecord::new(Uuid::new_v3(&Uuid::NAMESPACE_URL, name.as_bytes()), name, texture);
        self.skins.insert(record.clone());
        record
    }

    pub fn tick(&self) -> usize {
        self.scheduler.advance()
    }
}
