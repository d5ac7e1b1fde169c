//! Per-NPC visibility tracker: the single-viewer protocol and its bulk forms.
//!
//! Per viewer the protocol is:
//!
//! ```text
//!   Idle --update_viewer--> Pending(N) --follow-up--> Pending(N-1) ... --> Idle
//! ```
//!
//! Entering `Pending` sends the skin and an "add to player list" packet.
//! Each follow-up (one every `packet_delay` ticks) sends a removal packet
//! while the removal policy holds, and the viewer returns to `Idle` once the
//! count reaches zero. A disconnect or despawn returns it to `Idle` at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use skintrack_engine::tick::TaskId;
use uuid::Uuid;

use super::SyncContext;
use super::cleanup::{RemovalKind, TrackerId, ViewerCleanup, ViewerCleanupRegistry};
use crate::npc::FakePlayer;
use crate::player_registry::PlayerInfo;
use crate::skin::SkinRecord;

/// Protocol state of one viewer with respect to one tracked NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Idle,
    Pending { retries_remaining: u8 },
}

#[derive(Debug, Clone, Copy)]
struct PendingViewer {
    retries_remaining: u8,
    /// Follow-up currently queued for this viewer, if any.
    task: Option<TaskId>,
    /// Connection the cycle was started for.
    session: u64,
    /// Whether the count is a removal count or the single silent step.
    removing: bool,
}

/// Tracks skin and player-list packets for one fake player.
pub struct EntityVisibilityTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    id: TrackerId,
    entity: Arc<FakePlayer>,
    ctx: Arc<SyncContext>,
    cleanup: Arc<ViewerCleanupRegistry>,
    skin: RwLock<Arc<SkinRecord>>,
    /// One-way latch, set when the NPC leaves the world.
    removed: AtomicBool,
    pending: DashMap<Uuid, PendingViewer>,
}

impl EntityVisibilityTracker {
    /// Create the tracker for `entity`. The first tracker created on a
    /// context also creates the cleanup registry.
    pub fn new(entity: Arc<FakePlayer>, ctx: &Arc<SyncContext>) -> Self {
        let cleanup = ctx.cleanup_registry();
        let skin = ctx.skins.resolve(&entity.skin_name());
        let inner = Arc::new(TrackerInner {
            id: TrackerId::next(),
            entity,
            ctx: Arc::clone(ctx),
            cleanup,
            skin: RwLock::new(skin),
            removed: AtomicBool::new(false),
            pending: DashMap::new(),
        });

        let handle: Arc<dyn ViewerCleanup> = inner.clone();
        inner.cleanup.attach(inner.id, Arc::downgrade(&handle));

        Self { inner }
    }

    pub fn id(&self) -> TrackerId {
        self.inner.id
    }

    pub fn entity(&self) -> &Arc<FakePlayer> {
        &self.inner.entity
    }

    /// The skin currently held by this tracker. Never missing: resolution
    /// falls back to a default skin.
    pub fn skin(&self) -> Arc<SkinRecord> {
        self.inner.current_skin()
    }

    pub fn is_removed(&self) -> bool {
        self.inner.is_removed()
    }

    pub fn viewer_state(&self, viewer: Uuid) -> ViewerState {
        match self.inner.pending.get(&viewer) {
            Some(entry) => ViewerState::Pending {
                retries_remaining: entry.retries_remaining,
            },
            None => ViewerState::Idle,
        }
    }

    /// Number of viewers currently mid-protocol.
    pub fn pending_viewers(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether viewers should currently have this NPC removed from their
    /// player list once the skin has loaded.
    pub fn should_remove_from_player_list(&self) -> bool {
        self.inner.should_remove()
    }

    // ── Protocol operations ─────────────────────────────────────────────

    /// Re-resolve the skin and respawn the NPC for every viewer in tracking
    /// range that can see it, so clients reload the texture.
    ///
    /// The respawn re-adds the NPC to the viewer's player list, so it enters
    /// the protocol like a spawn would: a viewer mid-protocol keeps its
    /// queued follow-ups, anyone else starts a new removal cycle.
    pub fn apply_skin_change(&self) {
        let inner = &self.inner;
        if inner.is_removed() {
            return;
        }

        let skin = inner.ctx.skins.resolve(&inner.entity.skin_name());
        *inner.skin.write().expect("tracker skin poisoned") = Arc::clone(&skin);
        inner.entity.apply_skin(&skin);

        let location = inner.entity.location();
        let mut respawned = 0;
        for viewer in inner.ctx.players.viewers() {
            if !viewer.can_see(inner.entity.uuid)
                || !location.within(&viewer.location, inner.ctx.tracking_radius)
            {
                continue;
            }
            let claimed = inner.claim(&viewer).is_some();
            if claimed {
                inner.cleanup.cancel(viewer.uuid, inner.entity.uuid);
            }
            inner.ctx.transport.respawn_for_viewer(viewer.uuid, &inner.entity);
            if claimed {
                inner.schedule_follow_up(viewer.uuid);
            }
            respawned += 1;
        }

        tracing::info!(
            "NPC {} skin changed to '{}', respawned for {} viewers",
            inner.entity.name,
            skin.name,
            respawned
        );
    }

    /// Start the skin/player-list protocol for one viewer.
    ///
    /// Silently ignored if the viewer is itself a fake player, the NPC has
    /// been removed, or the viewer is already mid-protocol on the same
    /// connection. State left over from an earlier connection is replaced.
    pub fn update_viewer(&self, viewer: &PlayerInfo) {
        let inner = &self.inner;
        if viewer.fake || inner.is_removed() {
            return;
        }

        let Some(retries) = inner.claim(viewer) else {
            return;
        };

        // The viewer may still be in the tail of an earlier cycle.
        inner.cleanup.cancel(viewer.uuid, inner.entity.uuid);

        let skin = inner.current_skin();
        inner.entity.apply_skin(&skin);
        inner.ctx.transport.send_add_to_list(viewer.uuid, &inner.entity);

        tracing::debug!(
            "NPC {} -> {}: added to player list, {} follow-ups",
            inner.entity.name,
            viewer.name,
            retries
        );

        inner.schedule_follow_up(viewer.uuid);
    }

    /// Run [`update_viewer`](Self::update_viewer) for every real viewer in
    /// the NPC's world within `radius` blocks that can see it. Returns the
    /// number of viewers visited.
    pub fn update_nearby_viewers(&self, radius: f64) -> usize {
        let inner = &self.inner;
        if inner.is_removed() {
            return 0;
        }

        let location = inner.entity.location();
        let mut visited = 0;
        for viewer in inner.ctx.players.viewers() {
            if !viewer.can_see(inner.entity.uuid) {
                continue;
            }
            if !location.within(&viewer.location, radius) {
                continue;
            }
            self.update_viewer(&viewer);
            visited += 1;
        }
        visited
    }

    /// The NPC has left the world. Latches the tracker, drops all per-viewer
    /// state, and removes the NPC from every viewer's player list twice: once
    /// now and once after the packet delay, so the removal cannot be lost to
    /// the client's own list sync.
    pub fn on_entity_removed(&self) {
        let inner = &self.inner;
        if inner.removed.swap(true, Ordering::SeqCst) {
            return;
        }

        inner.clear_pending();

        let viewers = inner.ctx.players.viewers();
        for viewer in &viewers {
            inner
                .ctx
                .transport
                .send_remove_from_list(viewer.uuid, &inner.entity);
            inner.cleanup.schedule_final_removal(
                viewer.uuid,
                inner.id,
                Arc::clone(&inner.entity),
                inner.ctx.packet_delay,
            );
        }
        inner.cleanup.detach(inner.id);

        tracing::info!(
            "NPC {} removed, player-list removal sent to {} viewers",
            inner.entity.name,
            viewers.len()
        );
    }
}

impl TrackerInner {
    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    fn current_skin(&self) -> Arc<SkinRecord> {
        Arc::clone(&self.skin.read().expect("tracker skin poisoned"))
    }

    fn should_remove(&self) -> bool {
        self.ctx
            .policy
            .should_remove(self.entity.remove_from_player_list())
    }

    /// Enter `Pending` for `viewer`. Returns the cycle's count, or `None` if
    /// the viewer is already mid-protocol on this connection.
    fn claim(&self, viewer: &PlayerInfo) -> Option<u8> {
        let removing = self.should_remove();
        let fresh = PendingViewer {
            // One silent follow-up when not removing, just to clear the entry.
            retries_remaining: if removing { self.ctx.remove_retries } else { 1 },
            task: None,
            session: viewer.session,
            removing,
        };

        let stale = match self.pending.entry(viewer.uuid) {
            Entry::Occupied(slot) if slot.get().session == viewer.session => return None,
            Entry::Occupied(mut slot) => Some(slot.insert(fresh)),
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                None
            }
        };

        if let Some(stale) = stale {
            if let Some(task) = stale.task {
                self.ctx.scheduler.cancel(task);
            }
            self.cleanup.forget(viewer.uuid, self.id, RemovalKind::FollowUp);
            tracing::debug!(
                "NPC {} -> {}: replacing cycle from an earlier connection",
                self.entity.name,
                viewer.name
            );
        }
        Some(fresh.retries_remaining)
    }

    fn schedule_follow_up(self: &Arc<Self>, viewer: Uuid) {
        if self.is_removed() {
            return;
        }

        let tracker: Weak<Self> = Arc::downgrade(self);
        let task = self.ctx.scheduler.schedule(
            self.ctx.packet_delay,
            Box::new(move || {
                if let Some(tracker) = tracker.upgrade() {
                    tracker.on_follow_up(viewer);
                }
            }),
        );

        if let Some(mut entry) = self.pending.get_mut(&viewer) {
            entry.task = Some(task);
        }
        self.cleanup
            .register(viewer, self.id, self.entity.uuid, task, RemovalKind::FollowUp);
    }

    /// Scheduled step. Re-checks everything instead of trusting the state
    /// captured when it was scheduled.
    fn on_follow_up(self: &Arc<Self>, viewer: Uuid) {
        self.cleanup.forget(viewer, self.id, RemovalKind::FollowUp);

        if self.is_removed() || !self.ctx.players.is_online(viewer) {
            self.pending.remove(&viewer);
            return;
        }

        let remove = self.should_remove();
        let settled = {
            let Some(mut entry) = self.pending.get_mut(&viewer) else {
                return;
            };
            entry.task = None;
            if remove && !entry.removing {
                // Policy turned on mid-cycle: the full count runs from here.
                entry.removing = true;
                entry.retries_remaining = self.ctx.remove_retries;
            }
            entry.retries_remaining = if remove {
                entry.retries_remaining.saturating_sub(1)
            } else {
                0
            };
            entry.retries_remaining == 0
        };

        if remove {
            self.ctx
                .transport
                .send_remove_from_list(viewer, &self.entity);
            tracing::debug!("NPC {} -> {}: removed from player list", self.entity.name, viewer);
        }

        if settled {
            self.pending.remove(&viewer);
        } else {
            self.schedule_follow_up(viewer);
        }
    }

    /// Cancel every queued follow-up and forget all viewers.
    fn clear_pending(&self) {
        let drained: Vec<(Uuid, Option<TaskId>)> = self
            .pending
            .iter()
            .map(|entry| (*entry.key(), entry.value().task))
            .collect();
        self.pending.clear();

        for (viewer, task) in drained {
            if let Some(task) = task {
                self.ctx.scheduler.cancel(task);
            }
            self.cleanup.forget(viewer, self.id, RemovalKind::FollowUp);
        }
    }
}

impl ViewerCleanup for TrackerInner {
    fn drop_viewer(&self, viewer: Uuid) {
        self.pending.remove(&viewer);
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        // Final removals hold the entity, not the tracker, and stay queued.
        self.clear_pending();
        self.cleanup.detach(self.id);
    }
}
