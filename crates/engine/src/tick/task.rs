use slotmap::new_key_type;

new_key_type! {
    /// Handle to a scheduled action. Stale handles are harmless: cancelling
    /// a task that already ran (or was already cancelled) does nothing.
    pub struct TaskId;
}

/// A server tick number.
pub type Tick = u64;

/// A deferred unit of work. Runs at most once.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// A task waiting in the queue.
pub struct ScheduledTask {
    pub due: Tick,
    /// Tie-breaker among tasks due on the same tick (FIFO).
    pub seq: u64,
    pub action: Action,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("due", &self.due)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}
