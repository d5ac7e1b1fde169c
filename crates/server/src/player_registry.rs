//! Shared registry of connected players (viewers) and fake players.
//!
//! Viewer enumeration for the nearby sweep reads from here, and `deregister`
//! is the disconnect event source the cleanup registry subscribes to.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use skintrack_engine::world::position::Location;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the lifecycle broadcast. Movement is high-frequency, so leave
/// room for a few ticks of backlog at a busy server.
const EVENT_CAPACITY: usize = 512;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// A connected player (or a registered fake player).
#[derive(Clone, Debug)]
pub struct PlayerInfo {
    pub uuid: Uuid,
    pub name: String,
    /// True for NPCs registered as player-like entities. Fake players never
    /// act as viewers.
    pub fake: bool,
    pub location: Location,
    /// Entities this player currently cannot see.
    pub hidden: HashSet<Uuid>,
    /// Distinguishes a reconnect from the connection it replaced; the uuid
    /// stays the same across both.
    pub session: u64,
}

impl PlayerInfo {
    pub fn new(uuid: Uuid, name: impl Into<String>, location: Location) -> Self {
        Self {
            uuid,
            name: name.into(),
            fake: false,
            location,
            hidden: HashSet::new(),
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn fake(uuid: Uuid, name: impl Into<String>, location: Location) -> Self {
        Self {
            fake: true,
            ..Self::new(uuid, name, location)
        }
    }

    pub fn can_see(&self, entity: Uuid) -> bool {
        !self.hidden.contains(&entity)
    }
}

/// Lifecycle events broadcast to subscribers.
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    Joined { uuid: Uuid, fake: bool },
    Left { uuid: Uuid, fake: bool },
    Moved { uuid: Uuid, location: Location },
}

/// Thread-safe registry of everything that is "online".
///
/// Uses `std::sync::RwLock` because every operation is brief (no awaits while
/// the lock is held) and the access pattern is read-heavy. Iteration order is
/// join order.
pub struct PlayerRegistry {
    players: RwLock<IndexMap<Uuid, PlayerInfo>>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            players: RwLock::new(IndexMap::new()),
            event_tx,
        }
    }

    /// Register a player and broadcast `PlayerEvent::Joined`. Re-registering
    /// a uuid replaces the previous entry.
    pub fn register(&self, info: PlayerInfo) {
        let event = PlayerEvent::Joined {
            uuid: info.uuid,
            fake: info.fake,
        };
        self.players
            .write()
            .expect("player registry poisoned")
            .insert(info.uuid, info);
        // Best-effort: if no subscribers yet, the send fails silently.
        let _ = self.event_tx.send(event);
    }

    /// Remove a player and broadcast `PlayerEvent::Left`.
    pub fn deregister(&self, uuid: Uuid) -> Option<PlayerInfo> {
        let info = self
            .players
            .write()
            .expect("player registry poisoned")
            .shift_remove(&uuid);
        if let Some(info) = &info {
            let _ = self.event_tx.send(PlayerEvent::Left {
                uuid: info.uuid,
                fake: info.fake,
            });
        }
        info
    }

    /// Update a player's location, broadcasting `PlayerEvent::Moved`.
    pub fn update_location(&self, uuid: Uuid, location: Location) {
        {
            let mut players = self.players.write().expect("player registry poisoned");
            let Some(info) = players.get_mut(&uuid) else {
                return;
            };
            info.location = location;
        }
        let _ = self.event_tx.send(PlayerEvent::Moved { uuid, location });
    }

    /// Hide `entity` from `viewer`.
    pub fn hide_entity(&self, viewer: Uuid, entity: Uuid) {
        if let Some(info) = self
            .players
            .write()
            .expect("player registry poisoned")
            .get_mut(&viewer)
        {
            info.hidden.insert(entity);
        }
    }

    /// Make `entity` visible to `viewer` again.
    pub fn show_entity(&self, viewer: Uuid, entity: Uuid) {
        if let Some(info) = self
            .players
            .write()
            .expect("player registry poisoned")
            .get_mut(&viewer)
        {
            info.hidden.remove(&entity);
        }
    }

    pub fn get(&self, uuid: Uuid) -> Option<PlayerInfo> {
        self.players
            .read()
            .expect("player registry poisoned")
            .get(&uuid)
            .cloned()
    }

    pub fn is_online(&self, uuid: Uuid) -> bool {
        self.players
            .read()
            .expect("player registry poisoned")
            .contains_key(&uuid)
    }

    /// Snapshot of real (non-fake) players only.
    pub fn viewers(&self) -> Vec<PlayerInfo> {
        self.players
            .read()
            .expect("player registry poisoned")
            .values()
            .filter(|p| !p.fake)
            .cloned()
            .collect()
    }

    /// Subscribe to player lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
