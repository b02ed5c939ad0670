//! Scheduler errors.

use thiserror::Error;

/// Misuse of the scheduler API that the caller can observe and handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The configured stack size is outside the supported range.
    #[error("stack size {requested} is outside {minimum}..={maximum} bytes")]
    InvalidStackSize {
        requested: usize,
        minimum: usize,
        maximum: usize,
    },

    /// `start` was called on a registry with an empty ring.
    #[error("cannot start a scheduler with no registered tasks")]
    NoTasks,

    /// The registry already left the `Idle` state.
    #[error("scheduler has already been started")]
    AlreadyStarted,
}

/// Terminate the process after a condition the scheduler cannot recover
/// from, such as failing to map a stack.
///
/// The diagnostic goes to the `log` facade and to stderr, since no logger
/// may be installed.
#[cold]
pub(crate) fn fatal(msg: &str) -> ! {
    log::error!("fatal: {msg}");
    eprintln!("mycoroutine: fatal: {msg}");
    std::process::abort()
}
