use std::collections::BTreeMap;

use slotmap::SlotMap;

use super::task::{Action, ScheduledTask, TaskId, Tick};

/// Ordered store of pending tasks keyed by `(due tick, sequence)`.
///
/// Invariant: every key in `order` refers to a live slot in `tasks`, and
/// every live slot has exactly one entry in `order`.
pub struct TickQueue {
    tasks: SlotMap<TaskId, ScheduledTask>,
    order: BTreeMap<(Tick, u64), TaskId>,
    next_seq: u64,
}

impl TickQueue {
    pub fn new() -> Self {
        Self {
            tasks: SlotMap::with_key(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, due: Tick, action: Action) -> TaskId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.tasks.insert(ScheduledTask { due, seq, action });
        self.order.insert((due, seq), id);
        id
    }

    /// Remove a task before it runs. Returns `false` if it already ran or
    /// was already removed.
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.tasks.remove(id) {
            Some(task) => {
                self.order.remove(&(task.due, task.seq));
                true
            }
            None => false,
        }
    }

    /// Pop the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: Tick) -> Option<(TaskId, Action)> {
        let (&(due, _), _) = self.order.first_key_value()?;
        if due > now {
            return None;
        }
        let (_, id) = self.order.pop_first()?;
        let task = self.tasks.remove(id)?;
        Some((id, task.action))
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Tick of the earliest pending task, if any.
    pub fn next_due(&self) -> Option<Tick> {
        self.order.first_key_value().map(|(&(due, _), _)| due)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TickQueue {
    fn default() -> Self {
        Self::new()
    }
}
