//! CPU-specific register snapshots and the raw switch routine.
//!
//! Each backend exports the same two items:
//! - `Registers`: the callee-saved state of a suspended context, and
//!   `Registers::prepare` to start `entry(arg)` on a fresh stack
//! - `context_switch`: save into one snapshot, resume another

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::*;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("mycoroutine only supports x86_64 and aarch64");
