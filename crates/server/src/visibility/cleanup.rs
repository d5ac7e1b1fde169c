//! Process-wide index of pending removal packets, keyed by viewer.
//!
//! Every delayed player-list removal (a tracker's counted follow-up, or the
//! one-shot removal issued when an NPC despawns) is registered here under the
//! viewer it targets. A single disconnect subscription can then cancel every
//! tracker's half-finished work for that viewer without each tracker having
//! to subscribe on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use skintrack_engine::tick::{PacketScheduler, TaskId, Tick};
use tokio::sync::broadcast::{self, error::TryRecvError};
use uuid::Uuid;

use crate::npc::FakePlayer;
use crate::player_registry::{PlayerEvent, PlayerRegistry};
use crate::transport::PlayerListTransport;

static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one tracker instance. A respawned NPC keeps its uuid but gets
/// a new tracker, and therefore a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerId(u64);

impl TrackerId {
    pub fn next() -> Self {
        Self(NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which protocol step a pending removal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    /// Counted follow-up owned by a tracker's per-viewer state.
    FollowUp,
    /// Guaranteed removal scheduled when the NPC was despawned.
    Final,
}

/// Implemented by trackers so the registry can drop their per-viewer state.
pub trait ViewerCleanup: Send + Sync {
    /// Forget any pending protocol state for `viewer`. Must be idempotent.
    fn drop_viewer(&self, viewer: Uuid);
}

#[derive(Debug, Clone, Copy)]
struct PendingRemoval {
    tracker: TrackerId,
    entity: Uuid,
    task: TaskId,
    kind: RemovalKind,
}

pub struct ViewerCleanupRegistry {
    scheduler: Arc<dyn PacketScheduler>,
    transport: Arc<dyn PlayerListTransport>,
    players: Arc<PlayerRegistry>,
    /// Pending removals per viewer.
    pending: DashMap<Uuid, Vec<PendingRemoval>>,
    /// Live trackers. Weak so the registry never keeps a despawned NPC alive.
    trackers: DashMap<TrackerId, Weak<dyn ViewerCleanup>>,
    disconnects: Mutex<broadcast::Receiver<PlayerEvent>>,
}

impl ViewerCleanupRegistry {
    pub fn new(
        scheduler: Arc<dyn PacketScheduler>,
        transport: Arc<dyn PlayerListTransport>,
        players: Arc<PlayerRegistry>,
    ) -> Self {
        let disconnects = Mutex::new(players.subscribe());
        Self {
            scheduler,
            transport,
            players,
            pending: DashMap::new(),
            trackers: DashMap::new(),
            disconnects,
        }
    }

    // ── Tracker bookkeeping ─────────────────────────────────────────────

    pub fn attach(&self, tracker: TrackerId, handle: Weak<dyn ViewerCleanup>) {
        self.trackers.insert(tracker, handle);
    }

    pub fn detach(&self, tracker: TrackerId) {
        self.trackers.remove(&tracker);
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    // ── Pending removals ────────────────────────────────────────────────

    /// Record a scheduled removal for `viewer`.
    pub fn register(
        &self,
        viewer: Uuid,
        tracker: TrackerId,
        entity: Uuid,
        task: TaskId,
        kind: RemovalKind,
    ) {
        self.pending.entry(viewer).or_default().push(PendingRemoval {
            tracker,
            entity,
            task,
            kind,
        });
    }

    /// Drop the record of a removal that is running (or will never run)
    /// without cancelling anything.
    pub fn forget(&self, viewer: Uuid, tracker: TrackerId, kind: RemovalKind) {
        let now_empty = match self.pending.get_mut(&viewer) {
            Some(mut list) => {
                list.retain(|p| !(p.tracker == tracker && p.kind == kind));
                list.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.pending.remove_if(&viewer, |_, list| list.is_empty());
        }
    }

    /// Cancel every pending removal of `entity` toward `viewer`, whichever
    /// tracker scheduled it. Returns the number of actions cancelled.
    pub fn cancel(&self, viewer: Uuid, entity: Uuid) -> usize {
        let cancelled: Vec<PendingRemoval> = match self.pending.get_mut(&viewer) {
            Some(mut list) => {
                let (matching, rest): (Vec<_>, Vec<_>) =
                    list.drain(..).partition(|p| p.entity == entity);
                *list = rest;
                matching
            }
            None => return 0,
        };
        self.pending.remove_if(&viewer, |_, list| list.is_empty());
        self.cancel_all(viewer, &cancelled);
        cancelled.len()
    }

    /// Cancel everything pending for a viewer that has gone away and make
    /// every affected tracker forget it. Safe to call repeatedly.
    pub fn viewer_disconnected(&self, viewer: Uuid) -> usize {
        let Some((_, cancelled)) = self.pending.remove(&viewer) else {
            return 0;
        };
        self.cancel_all(viewer, &cancelled);
        if !cancelled.is_empty() {
            tracing::debug!(
                "Viewer {} disconnected: cancelled {} pending removals",
                viewer,
                cancelled.len()
            );
        }
        cancelled.len()
    }

    fn cancel_all(&self, viewer: Uuid, removals: &[PendingRemoval]) {
        for removal in removals {
            self.scheduler.cancel(removal.task);
            if removal.kind == RemovalKind::FollowUp {
                let handle = self
                    .trackers
                    .get(&removal.tracker)
                    .map(|h| Weak::clone(h.value()));
                if let Some(tracker) = handle.and_then(|h| h.upgrade()) {
                    tracker.drop_viewer(viewer);
                }
            }
        }
    }

    /// Number of removals pending for `viewer`.
    pub fn pending_for(&self, viewer: Uuid) -> usize {
        self.pending.get(&viewer).map_or(0, |list| list.len())
    }

    pub fn pending_total(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }

    // ── Final removal ───────────────────────────────────────────────────

    /// Send one more player-list removal of `entity` to `viewer` after
    /// `delay` ticks. Holds the entity, not its tracker, so it still fires
    /// after the tracker is gone.
    pub fn schedule_final_removal(
        self: &Arc<Self>,
        viewer: Uuid,
        tracker: TrackerId,
        entity: Arc<FakePlayer>,
        delay: Tick,
    ) {
        let registry = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);
        let entity_uuid = entity.uuid;
        let task = self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.forget(viewer, tracker, RemovalKind::Final);
                    if !registry.players.is_online(viewer) {
                        return;
                    }
                }
                transport.send_remove_from_list(viewer, &entity);
            }),
        );
        self.register(viewer, tracker, entity_uuid, task, RemovalKind::Final);
    }

    // ── Disconnect subscription ─────────────────────────────────────────

    /// Drain queued player lifecycle events and handle every real-player
    /// disconnect that still stands. Called once per tick before scheduled
    /// tasks run.
    pub fn pump_disconnects(&self) -> usize {
        let mut handled = 0;
        let mut lagged = false;
        let mut left = Vec::new();
        {
            let mut rx = self.disconnects.lock().expect("disconnect receiver poisoned");
            loop {
                match rx.try_recv() {
                    Ok(PlayerEvent::Left { uuid, fake: false }) => left.push(uuid),
                    Ok(_) => {}
                    Err(TryRecvError::Lagged(skipped)) => {
                        tracing::warn!("Disconnect stream lagged, {} events skipped", skipped);
                        lagged = true;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }

        for viewer in left {
            // Reconnected before the event was pumped. The new session's
            // cycles stay; leftovers from the old one restart on the next
            // `update_viewer` or run out against the new connection.
            if self.players.is_online(viewer) {
                tracing::debug!("Viewer {} reconnected, ignoring stale disconnect", viewer);
                continue;
            }
            self.viewer_disconnected(viewer);
            handled += 1;
        }

        if lagged {
            handled += self.reconcile();
        }
        handled
    }

    /// Treat every viewer with pending removals that is no longer online as
    /// disconnected. Recovers from missed disconnect events.
    pub fn reconcile(&self) -> usize {
        let gone: Vec<Uuid> = self
            .pending
            .iter()
            .map(|entry| *entry.key())
            .filter(|viewer| !self.players.is_online(*viewer))
            .collect();
        for viewer in &gone {
            self.viewer_disconnected(*viewer);
        }
        gone.len()
    }
}
