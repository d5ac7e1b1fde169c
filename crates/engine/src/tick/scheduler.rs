use std::sync::Mutex;

use super::queue::TickQueue;
use super::task::{Action, TaskId, Tick};

/// Deferred, cancellable execution on the tick thread.
///
/// Guarantees:
/// - an action runs at most once, strictly after the tick it was scheduled in;
/// - `cancel` before execution means the action never runs;
/// - `cancel` after execution is a no-op.
pub trait PacketScheduler: Send + Sync {
    /// Run `action` after `delay` ticks. A delay of 0 is treated as 1.
    fn schedule(&self, delay: Tick, action: Action) -> TaskId;

    /// Drop a pending action. Returns `true` if the action was still pending.
    fn cancel(&self, id: TaskId) -> bool;

    /// The tick currently being (or last) processed.
    fn now(&self) -> Tick;
}

struct Inner {
    now: Tick,
    queue: TickQueue,
}

/// Single-queue virtual-time scheduler.
///
/// The owner drives time by calling [`advance`](Self::advance) once per server
/// tick. Actions are popped one at a time and run with the lock released, so
/// an action may schedule or cancel other tasks (including ones due on the
/// same tick).
pub struct TickScheduler {
    inner: Mutex<Inner>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                now: 0,
                queue: TickQueue::new(),
            }),
        }
    }

    // ── Driving time ────────────────────────────────────────────────────

    /// Move to the next tick and run every task due on it. Returns the
    /// number of tasks executed.
    pub fn advance(&self) -> usize {
        let now = {
            let mut inner = self.inner.lock().expect("tick scheduler poisoned");
            inner.now += 1;
            inner.now
        };

        let mut executed = 0;
        loop {
            let next = self
                .inner
                .lock()
                .expect("tick scheduler poisoned")
                .queue
                .pop_due(now);
            let Some((_, action)) = next else {
                break;
            };
            action();
            executed += 1;
        }

        if executed > 0 {
            tracing::trace!("tick {}: {} tasks executed", now, executed);
        }
        executed
    }

    /// Advance `ticks` times. Returns the total number of tasks executed.
    pub fn run_ticks(&self, ticks: u64) -> usize {
        (0..ticks).map(|_| self.advance()).sum()
    }

    /// Advance until the queue is empty or `max_ticks` ticks have elapsed.
    pub fn run_until_idle(&self, max_ticks: u64) -> usize {
        let mut total = 0;
        for _ in 0..max_ticks {
            if self.pending() == 0 {
                break;
            }
            total += self.advance();
        }
        total
    }

    // ── Introspection ───────────────────────────────────────────────────

    pub fn pending(&self) -> usize {
        self.inner.lock().expect("tick scheduler poisoned").queue.len()
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.inner
            .lock()
            .expect("tick scheduler poisoned")
            .queue
            .contains(id)
    }

    pub fn next_due(&self) -> Option<Tick> {
        self.inner
            .lock()
            .expect("tick scheduler poisoned")
            .queue
            .next_due()
    }
}

impl PacketScheduler for TickScheduler {
    fn schedule(&self, delay: Tick, action: Action) -> TaskId {
        let mut inner = self.inner.lock().expect("tick scheduler poisoned");
        let due = inner.now + delay.max(1);
        inner.queue.push(due, action)
    }

    fn cancel(&self, id: TaskId) -> bool {
        self.inner
            .lock()
            .expect("tick scheduler poisoned")
            .queue
            .remove(id)
    }

    fn now(&self) -> Tick {
        self.inner.lock().expect("tick scheduler poisoned").now
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}
