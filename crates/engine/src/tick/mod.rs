//! Virtual-time task scheduling.
//!
//! Time is measured in discrete server ticks, never wall-clock. Everything
//! here runs on the single logical thread that drives the tick loop; the
//! internal mutex only exists so handles can be shared across tasks.

pub mod queue;
pub mod scheduler;
pub mod task;

pub use scheduler::{PacketScheduler, TickScheduler};
pub use task::{Action, TaskId, Tick};
