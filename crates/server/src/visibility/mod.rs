//! Per-viewer skin and player-list synchronization for fake players.
//!
//! One [`EntityVisibilityTracker`] per NPC decides which packets each viewer
//! receives. All trackers share a [`SyncContext`] holding the collaborators
//! (scheduler, transport, viewer registry, skin resolver, policy) and the
//! process-wide [`ViewerCleanupRegistry`], which is created the first time a
//! tracker asks for it.
//!
//! Everything here runs on the tick thread. The `Arc`s and concurrent maps
//! let handles move into scheduled actions; they are not there for
//! parallelism.

pub mod cleanup;
pub mod tracker;

use std::sync::{Arc, OnceLock};

use skintrack_engine::tick::{PacketScheduler, Tick};

use crate::player_registry::PlayerRegistry;
use crate::settings::{PlayerListPolicy, Settings};
use crate::skin::SkinResolver;
use crate::transport::PlayerListTransport;

pub use cleanup::{RemovalKind, TrackerId, ViewerCleanup, ViewerCleanupRegistry};
pub use tracker::{EntityVisibilityTracker, ViewerState};

/// Collaborators and protocol constants shared by every tracker.
pub struct SyncContext {
    pub scheduler: Arc<dyn PacketScheduler>,
    pub transport: Arc<dyn PlayerListTransport>,
    pub players: Arc<PlayerRegistry>,
    pub skins: Arc<dyn SkinResolver>,
    pub policy: Arc<PlayerListPolicy>,
    /// Ticks between follow-up removal packets.
    pub packet_delay: Tick,
    /// Removal packets per viewer cycle. Never below 1.
    pub remove_retries: u8,
    /// Viewers farther than this do not track the NPC.
    pub tracking_radius: f64,
    cleanup: OnceLock<Arc<ViewerCleanupRegistry>>,
}

impl SyncContext {
    pub fn new(
        settings: &Settings,
        scheduler: Arc<dyn PacketScheduler>,
        transport: Arc<dyn PlayerListTransport>,
        players: Arc<PlayerRegistry>,
        skins: Arc<dyn SkinResolver>,
    ) -> Self {
        Self {
            scheduler,
            transport,
            players,
            skins,
            policy: Arc::new(PlayerListPolicy::from_settings(settings)),
            packet_delay: settings.packet_delay_ticks.max(1),
            remove_retries: settings.remove_packet_retries.max(1),
            tracking_radius: settings.nearby_radius,
            cleanup: OnceLock::new(),
        }
    }

    /// The process-wide cleanup registry, created (and subscribed to
    /// disconnects) on first use.
    pub fn cleanup_registry(&self) -> Arc<ViewerCleanupRegistry> {
        let registry = self.cleanup.get_or_init(|| {
            tracing::info!("Creating viewer cleanup registry");
            Arc::new(ViewerCleanupRegistry::new(
                Arc::clone(&self.scheduler),
                Arc::clone(&self.transport),
                Arc::clone(&self.players),
            ))
        });
        Arc::clone(registry)
    }

    /// The cleanup registry if any tracker has been created yet.
    pub fn cleanup_if_initialized(&self) -> Option<&Arc<ViewerCleanupRegistry>> {
        self.cleanup.get()
    }
}
