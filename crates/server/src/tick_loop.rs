//! The server tick: the single logical thread every protocol step runs on.
//!
//! Each tick, in order:
//! 1. queued disconnect events are handed to the cleanup registry,
//! 2. the scheduler advances one tick and runs the follow-ups due on it,
//! 3. every `sweep_every` ticks, each NPC sweeps for nearby viewers.
//!
//! Handling disconnects first means a viewer that left between two ticks
//! never receives the follow-up that was due on the next one. Sweeping last
//! means follow-ups queued by the sweep are due on a later tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use skintrack_engine::tick::{Tick, TickScheduler};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::npc_registry::NpcRegistry;
use crate::visibility::SyncContext;

pub struct TickLoop {
    scheduler: Arc<TickScheduler>,
    ctx: Arc<SyncContext>,
    npcs: Arc<NpcRegistry>,
    sweep_every: Tick,
    ticks: AtomicU64,
}

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    pub disconnects: usize,
    pub swept: usize,
    pub tasks: usize,
}

impl TickLoop {
    pub fn new(
        scheduler: Arc<TickScheduler>,
        ctx: Arc<SyncContext>,
        npcs: Arc<NpcRegistry>,
        sweep_every: Tick,
    ) -> Self {
        Self {
            scheduler,
            ctx,
            npcs,
            sweep_every: sweep_every.max(1),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let disconnects = self
            .ctx
            .cleanup_if_initialized()
            .map_or(0, |cleanup| cleanup.pump_disconnects());

        let tasks = self.scheduler.advance();

        let swept = if tick % self.sweep_every == 0 {
            self.npcs.sweep()
        } else {
            0
        };

        TickReport {
            tick,
            disconnects,
            swept,
            tasks,
        }
    }

    pub fn ticks(&self) -> Tick {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Drive `tick_loop` on a tokio interval until `shutdown` flips to `true`.
pub fn start(
    tick_loop: Arc<TickLoop>,
    tick_duration: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_duration);
        tracing::info!("Tick loop started ({:?} per tick)", tick_duration);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = tick_loop.tick();
                    if report.tasks > 0 || report.disconnects > 0 {
                        tracing::trace!(
                            "tick {}: {} tasks, {} disconnects, {} swept",
                            report.tick, report.tasks, report.disconnects, report.swept
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Tick loop stopped after {} ticks", tick_loop.ticks());
    })
}
