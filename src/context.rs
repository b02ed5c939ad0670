//! Execution contexts and the control-transfer primitive.
//!
//! - `Stack`: an mmap'ed stack with a guard page below it
//! - `ExecutionContext`: a register snapshot plus the stack it runs on
//! - `switch_to`: save one context, resume another

use crate::arch::{Registers, context_switch};
use crate::error::fatal;
use std::io;
use std::ptr::{self, NonNull};

/// Size of a memory page, falling back to 4KB if the OS will not say.
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// A dedicated stack region.
///
/// The mapping never moves, so a context may keep pointers into it for
/// as long as the `Stack` is alive. The lowest page is left inaccessible:
/// running off the end faults instead of trampling the heap.
#[derive(Debug)]
pub struct Stack {
    base: NonNull<u8>,
    /// Whole mapping, guard page included.
    mapped: usize,
    guard: usize,
}

impl Stack {
    /// Map a stack with at least `size` usable bytes.
    ///
    /// Failing to map memory terminates the process.
    pub fn new(size: usize) -> Stack {
        let page = page_size();
        let Some(mapped) = mapping_len(size, page) else {
            fatal(&format!("a {size}-byte stack does not fit in the address space"));
        };

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            fatal(&format!(
                "mmap of a {mapped}-byte stack failed: {}",
                io::Error::last_os_error()
            ));
        }

        if unsafe { libc::mprotect(base, page, libc::PROT_NONE) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::munmap(base, mapped) };
            fatal(&format!("mprotect of a stack guard page failed: {err}"));
        }

        let Some(base) = NonNull::new(base as *mut u8) else {
            fatal("mmap returned a null stack");
        };

        Stack {
            base,
            mapped,
            guard: page,
        }
    }

    /// Highest usable address, 16-byte aligned (the stack grows down).
    pub fn top(&self) -> usize {
        (self.base.as_ptr() as usize + self.mapped) & !0xF
    }

    /// Usable bytes, guard page excluded.
    pub fn size(&self) -> usize {
        self.mapped - self.guard
    }
}

/// Bytes to map for `size` usable bytes plus one guard page, or `None` on
/// overflow.
fn mapping_len(size: usize, page: usize) -> Option<usize> {
    size.max(1).checked_next_multiple_of(page)?.checked_add(page)
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.mapped);
        }
    }
}

/// A switchable unit of execution state.
///
/// Contexts made by [`ExecutionContext::new`] own their stack. The root
/// context has none: it describes whatever thread stack was live when it
/// was saved into.
#[derive(Debug)]
pub struct ExecutionContext {
    registers: Registers,
    stack: Option<Stack>,
}

impl ExecutionContext {
    /// An empty snapshot, only valid as the `save_into` side of a switch
    /// until something has been saved in it.
    pub fn root() -> Self {
        ExecutionContext {
            registers: Registers::default(),
            stack: None,
        }
    }

    /// A suspended context whose first resumption runs `entry(arg)` on
    /// `stack`.
    ///
    /// `entry` must never return: it has no caller frame to return into.
    pub fn new(entry: extern "C" fn(usize) -> !, arg: usize, stack: Stack) -> Self {
        let registers = Registers::prepare(stack.top(), entry, arg);
        ExecutionContext {
            registers,
            stack: Some(stack),
        }
    }

    /// Usable bytes of the owned stack; `None` for the root context.
    pub fn stack_size(&self) -> Option<usize> {
        self.stack.as_ref().map(Stack::size)
    }
}

/// Save the caller into `save_into` and resume `resume`.
///
/// Returns when a later `switch_to` targets `save_into`.
///
/// # Safety
/// Both pointers must be valid for the whole suspension and must not
/// alias. `resume` must have been built by [`ExecutionContext::new`] or
/// previously saved into, and its stack must still be alive.
pub unsafe fn switch_to(save_into: *mut ExecutionContext, resume: *const ExecutionContext) {
    let old = unsafe { &raw mut (*save_into).registers };
    let new = unsafe { &raw const (*resume).registers };
    context_switch(old, new);
}
