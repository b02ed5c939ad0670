//! aarch64 (AAPCS64) backend.

use std::arch::asm;
use std::arch::naked_asm;

/// Callee-saved state of a suspended aarch64 context.
///
/// x19-x28, the low halves of v8-v15 (d8-d15) and the FPCR control bits
/// must survive a call, so they travel with the context together with
/// sp, fp and lr.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Registers {
    sp: u64,
    /// Where `ret` lands on resume.
    lr: u64,
    fp: u64,
    /// Entry argument of a fresh context.
    x19: u64,
    /// Entry function of a fresh context.
    x20: u64,
    x21: u64,
    x22: u64,
    x23: u64,
    x24: u64,
    x25: u64,
    x26: u64,
    x27: u64,
    x28: u64,
    d8: u64,
    d9: u64,
    d10: u64,
    d11: u64,
    d12: u64,
    d13: u64,
    d14: u64,
    d15: u64,
    fpcr: u64,
}

impl Registers {
    /// Lay out a fresh context on a stack.
    ///
    /// `stack_top` must be 16-byte aligned. Nothing is written to the stack:
    /// `ret` jumps through lr into `bootstrap`, which calls `entry(arg)`.
    /// FPCR is copied from the caller.
    pub fn prepare(stack_top: usize, entry: extern "C" fn(usize) -> !, arg: usize) -> Self {
        Registers {
            sp: stack_top as u64,
            lr: bootstrap as usize as u64,
            x19: arg as u64,
            x20: entry as usize as u64,
            fpcr: live_fpcr(),
            ..Default::default()
        }
    }
}

fn live_fpcr() -> u64 {
    let fpcr: u64;
    unsafe {
        asm!("mrs {}, fpcr", out(reg) fpcr, options(nomem, nostack, preserves_flags));
    }
    fpcr
}

/// First instructions of every fresh context. A zero lr ends backtraces
/// at the entry function.
#[unsafe(naked)]
extern "C" fn bootstrap() -> ! {
    naked_asm!("mov x0, x19", "mov lr, xzr", "br x20");
}

/// Save the live state into `old` and resume `new`.
///
/// Returns once some other `context_switch` names `old` as its target.
/// Both pointers must be valid; `new` must come from `Registers::prepare`
/// or from an earlier save.
#[unsafe(naked)]
pub extern "C" fn context_switch(_old: *mut Registers, _new: *const Registers) {
    naked_asm!(
        // x0 = old
        "mov x9, sp",
        "str x9,  [x0, #0x00]",
        "str lr,  [x0, #0x08]",
        "str fp,  [x0, #0x10]",
        "stp x19, x20, [x0, #0x18]",
        "stp x21, x22, [x0, #0x28]",
        "stp x23, x24, [x0, #0x38]",
        "stp x25, x26, [x0, #0x48]",
        "stp x27, x28, [x0, #0x58]",
        "stp d8,  d9,  [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        "mrs x9, fpcr",
        "str x9,  [x0, #0xa8]",
        // x1 = new
        "ldr x9,  [x1, #0x00]",
        "mov sp, x9",
        "ldr lr,  [x1, #0x08]",
        "ldr fp,  [x1, #0x10]",
        "ldp x19, x20, [x1, #0x18]",
        "ldp x21, x22, [x1, #0x28]",
        "ldp x23, x24, [x1, #0x38]",
        "ldp x25, x26, [x1, #0x48]",
        "ldp x27, x28, [x1, #0x58]",
        "ldp d8,  d9,  [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        "ldr x9,  [x1, #0xa8]",
        "msr fpcr, x9",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Stack;
    use std::cell::{Cell, UnsafeCell};

    const ROUND_TOWARD_ZERO: u64 = 0b11 << 22;

    fn set_fpcr(value: u64) {
        unsafe {
            asm!("msr fpcr, {}", in(reg) value, options(nomem, nostack, preserves_flags));
        }
    }

    struct Pair {
        root: UnsafeCell<Registers>,
        coroutine: UnsafeCell<Registers>,
        seen: Cell<u64>,
    }

    extern "C" fn change_rounding(arg: usize) -> ! {
        let pair = unsafe { &*(arg as *const Pair) };
        pair.seen.set(live_fpcr());
        set_fpcr(live_fpcr() | ROUND_TOWARD_ZERO);
        loop {
            context_switch(pair.coroutine.get(), pair.root.get());
            pair.seen.set(live_fpcr());
        }
    }

    #[test]
    fn fpcr_follows_its_context() {
        let stack = Stack::new(16 * 1024);
        let pair = Box::new(Pair {
            root: UnsafeCell::new(Registers::default()),
            coroutine: UnsafeCell::new(Registers::default()),
            seen: Cell::new(0),
        });
        let arg = &*pair as *const Pair as usize;
        unsafe { *pair.coroutine.get() = Registers::prepare(stack.top(), change_rounding, arg) };

        let before = live_fpcr();
        context_switch(pair.root.get(), pair.coroutine.get());
        assert_eq!(pair.seen.get(), before);
        assert_eq!(live_fpcr(), before);

        context_switch(pair.root.get(), pair.coroutine.get());
        assert_eq!(pair.seen.get() & ROUND_TOWARD_ZERO, ROUND_TOWARD_ZERO);
        assert_eq!(live_fpcr(), before);
    }
}
