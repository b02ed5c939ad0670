//! x86_64 (System V) backend.

use std::arch::asm;
use std::arch::naked_asm;

/// Callee-saved state of a suspended x86_64 context.
///
/// Field order is part of the `context_switch` contract: offsets are
/// hard-coded in the assembly below. Besides the general purpose
/// registers, System V makes the MXCSR control bits and the x87 control
/// word callee-saved, so they travel with the context too.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Registers {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    /// Entry function of a fresh context.
    r14: u64,
    /// Entry argument of a fresh context.
    r15: u64,
    mxcsr: u32,
    fpu_cw: u16,
}

impl Registers {
    /// Lay out a fresh context on a stack.
    ///
    /// `stack_top` must be 16-byte aligned. The first `context_switch` into
    /// the result lands in `bootstrap`, which calls `entry(arg)`. The
    /// floating-point control state is copied from the caller.
    pub fn prepare(stack_top: usize, entry: extern "C" fn(usize) -> !, arg: usize) -> Self {
        // Return address for the `ret` in context_switch, with a zeroed
        // slot above it standing in for bootstrap's own return address.
        let rsp = stack_top - 16;
        unsafe {
            std::ptr::write(rsp as *mut u64, bootstrap as usize as u64);
            std::ptr::write((rsp + 8) as *mut u64, 0);
        }

        let (mxcsr, fpu_cw) = live_fp_control();
        Registers {
            rsp: rsp as u64,
            r14: entry as usize as u64,
            r15: arg as u64,
            mxcsr,
            fpu_cw,
            ..Default::default()
        }
    }
}

fn live_fp_control() -> (u32, u16) {
    let mut mxcsr: u32 = 0;
    let mut fpu_cw: u16 = 0;
    unsafe {
        asm!(
            "stmxcsr [{mxcsr}]",
            "fnstcw [{cw}]",
            mxcsr = in(reg) &mut mxcsr as *mut u32,
            cw = in(reg) &mut fpu_cw as *mut u16,
            options(nostack, preserves_flags)
        );
    }
    (mxcsr, fpu_cw)
}

/// First instructions of every fresh context.
///
/// rsp is 16n+8 here, as on entry to any called function, so jumping (not
/// calling) hands `entry` a correctly aligned frame.
#[unsafe(naked)]
extern "C" fn bootstrap() -> ! {
    naked_asm!("mov rdi, r15", "jmp r14", "ud2");
}

/// Save the live state into `old` and resume `new`.
///
/// Returns once some other `context_switch` names `old` as its target.
/// Both pointers must be valid; `new` must come from `Registers::prepare`
/// or from an earlier save.
#[unsafe(naked)]
pub extern "C" fn context_switch(_old: *mut Registers, _new: *const Registers) {
    naked_asm!(
        // rdi = old
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "stmxcsr [rdi + 0x38]",
        "fnstcw [rdi + 0x3c]",
        // rsi = new
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "ldmxcsr [rsi + 0x38]",
        "fldcw [rsi + 0x3c]",
        "ret",
    );
}
