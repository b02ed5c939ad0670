//! Scheduler configuration.

use crate::error::SchedulerError;
use log::warn;

/// Stack size used when nothing else is configured (64KB).
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack a task or the dispatcher may run on (16KB).
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Largest stack a task or the dispatcher may ask for (1GB).
pub const MAX_STACK_SIZE: usize = 1024 * 1024 * 1024;

/// Environment variable read by [`SchedulerConfig::from_env`].
pub const STACK_SIZE_ENV: &str = "COROUTINE_STACK_SIZE";

/// Settings shared by every context a registry creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Usable bytes of every task stack and of the dispatcher stack.
    /// Rounded up to the page size when the stack is mapped.
    pub stack_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl SchedulerConfig {
    /// A configuration with the given stack size, not yet validated.
    pub fn with_stack_size(stack_size: usize) -> Self {
        SchedulerConfig { stack_size }
    }

    /// Build a configuration from `COROUTINE_STACK_SIZE`.
    ///
    /// Unset or unparsable values fall back to the default.
    pub fn from_env() -> Self {
        match std::env::var(STACK_SIZE_ENV) {
            Ok(value) => match parse_size(&value) {
                Some(stack_size) => SchedulerConfig { stack_size },
                None => {
                    warn!("ignoring {STACK_SIZE_ENV}={value:?}: not a size");
                    SchedulerConfig::default()
                }
            },
            Err(_) => SchedulerConfig::default(),
        }
    }

    /// Check that the stack size is within `MIN_STACK_SIZE..=MAX_STACK_SIZE`.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !(MIN_STACK_SIZE..=MAX_STACK_SIZE).contains(&self.stack_size) {
            return Err(SchedulerError::InvalidStackSize {
                requested: self.stack_size,
                minimum: MIN_STACK_SIZE,
                maximum: MAX_STACK_SIZE,
            });
        }
        Ok(())
    }
}

/// Parse a byte count, optionally suffixed with `k`/`K` for KiB.
fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    let (digits, scale) = match value.strip_suffix(['k', 'K']) {
        Some(digits) => (digits, 1024),
        None => (value, 1),
    };
    digits.parse::<usize>().ok()?.checked_mul(scale)
}
