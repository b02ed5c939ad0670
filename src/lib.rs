//! A single-threaded cooperative coroutine scheduler.
//!
//! Tasks run on their own stacks and give control back with
//! [`Registry::yield_now`]. The dispatcher then resumes the next unfinished
//! task in registration order, round robin, until every task has returned.
//!
//! Nothing is preempted: a task that never yields keeps the thread.
//!
//! Layers, bottom up:
//! - `arch`: register snapshots and the naked-asm switch
//! - [`context`]: stacks, execution contexts, `switch_to`
//! - `ring`: the closed rotation tasks are kept in
//! - [`task`] and [`registry`]: the scheduler itself

mod arch;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod registry;
mod ring;
pub mod task;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use registry::{DispatchStats, Registry, SchedulerState};
pub use task::{Task, TaskId};
