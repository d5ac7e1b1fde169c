//! Fire-and-forget packet emission toward viewers.
//!
//! The tracker only talks to [`PlayerListTransport`]. [`PacketRouter`] is the
//! production implementation: one unbounded outbox per connected viewer, which
//! the connection task drains and encodes. Encoding itself lives with the
//! connection, not here.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::npc::FakePlayer;

/// Packets the visibility subsystem emits, in wire order per viewer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientboundPacket {
    /// Player-info "add player" action, carrying the skin applied to the
    /// entity's profile at send time.
    PlayerInfoAdd {
        uuid: Uuid,
        name: String,
        texture: String,
        signature: Option<String>,
    },
    /// Player-info removal (drops the entry from the tab list).
    PlayerInfoRemove { uuids: Vec<Uuid> },
    /// Destroy client-side entities.
    RemoveEntities { entity_ids: Vec<i32> },
    /// Spawn a player entity.
    AddPlayer {
        entity_id: i32,
        uuid: Uuid,
        x: f64,
        y: f64,
        z: f64,
    },
}

impl ClientboundPacket {
    pub fn player_info_add(entity: &FakePlayer) -> Self {
        let (texture, signature) = match entity.applied_skin() {
            Some(skin) => (skin.texture.clone(), skin.signature.clone()),
            None => (String::new(), None),
        };
        Self::PlayerInfoAdd {
            uuid: entity.uuid,
            name: entity.name.clone(),
            texture,
            signature,
        }
    }

    pub fn player_info_remove(entity: &FakePlayer) -> Self {
        Self::PlayerInfoRemove {
            uuids: vec![entity.uuid],
        }
    }

    pub fn add_player(entity: &FakePlayer) -> Self {
        let location = entity.location();
        Self::AddPlayer {
            entity_id: entity.entity_id,
            uuid: entity.uuid,
            x: location.x,
            y: location.y,
            z: location.z,
        }
    }
}

/// Packet sink the visibility tracker writes to. Implementations must not
/// block and must silently drop packets for viewers they do not know.
pub trait PlayerListTransport: Send + Sync {
    fn send_add_to_list(&self, viewer: Uuid, entity: &FakePlayer);

    fn send_remove_from_list(&self, viewer: Uuid, entity: &FakePlayer);

    /// Destroy and recreate `entity` for `viewer` so the client reloads
    /// its skin.
    fn respawn_for_viewer(&self, viewer: Uuid, entity: &FakePlayer);
}

/// Per-viewer outboxes.
pub struct PacketRouter {
    outboxes: DashMap<Uuid, mpsc::UnboundedSender<ClientboundPacket>>,
}

impl PacketRouter {
    pub fn new() -> Self {
        Self {
            outboxes: DashMap::new(),
        }
    }

    /// Open an outbox for `viewer`, replacing any previous one.
    pub fn open(&self, viewer: Uuid) -> mpsc::UnboundedReceiver<ClientboundPacket> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.insert(viewer, tx);
        rx
    }

    pub fn close(&self, viewer: Uuid) {
        self.outboxes.remove(&viewer);
    }

    pub fn is_open(&self, viewer: Uuid) -> bool {
        self.outboxes.contains_key(&viewer)
    }

    /// Queue a packet. Returns `false` if the viewer has no live outbox.
    pub fn send(&self, viewer: Uuid, packet: ClientboundPacket) -> bool {
        let delivered = match self.outboxes.get(&viewer) {
            Some(tx) => tx.send(packet).is_ok(),
            None => false,
        };
        if !delivered {
            tracing::trace!("Dropping packet for {}: no outbox", viewer);
        }
        delivered
    }
}

impl PlayerListTransport for PacketRouter {
    fn send_add_to_list(&self, viewer: Uuid, entity: &FakePlayer) {
        self.send(viewer, ClientboundPacket::player_info_add(entity));
    }

    fn send_remove_from_list(&self, viewer: Uuid, entity: &FakePlayer) {
        self.send(viewer, ClientboundPacket::player_info_remove(entity));
    }

    fn respawn_for_viewer(&self, viewer: Uuid, entity: &FakePlayer) {
        self.send(
            viewer,
            ClientboundPacket::RemoveEntities {
                entity_ids: vec![entity.entity_id],
            },
        );
        self.send(viewer, ClientboundPacket::player_info_add(entity));
        self.send(viewer, ClientboundPacket::add_player(entity));
    }
}

impl Default for PacketRouter {
    fn default() -> Self {
        Self::new()
    }
}
