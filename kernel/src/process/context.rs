//! Execution contexts and the transfer primitives.
//!
//! An [`ExecutionContext`] is an opaque snapshot of the callee-saved
//! register state of a suspended kernel control flow. Three primitives
//! move execution between contexts, and one leaves ring 0 entirely:
//!
//! - [`capture`]: snapshot the current point; returns 0 now and the
//!   resumer's value if control ever comes back (so resumers must pass
//!   a non-zero value).
//! - [`resume`]: jump into a captured context, never returns.
//! - [`switch`]: capture the current point into one context and resume
//!   another in a single step; the scheduler's primitive. A context
//!   suspended by `switch` observes the value 1 when resumed.
//! - [`enter_user`]: iretq into ring 3 at a program's entry point.
//!
//! Exactly one resumer may target a captured context, and a context
//! must not be resumed twice.

use core::arch::{asm, naked_asm};

/// Callee-saved register snapshot.
///
/// Field order is the asm layout; the offsets in the naked routines
/// below index straight into this struct.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ExecutionContext {
    pub(self) r15: u64, // 0x00
    pub(self) r14: u64, // 0x08
    pub(self) r13: u64, // 0x10
    pub(self) r12: u64, // 0x18
    pub(self) rbx: u64, // 0x20
    pub(self) rbp: u64, // 0x28
    pub(self) rsp: u64, // 0x30
    pub(self) rip: u64, // 0x38
}

impl ExecutionContext {
    /// A context that has never been captured.
    pub const fn empty() -> Self {
        ExecutionContext {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            rsp: 0,
            rip: 0,
        }
    }
}

/// Snapshot the caller's continuation into `ctx`.
///
/// Returns 0 on the capturing path. When some other flow later calls
/// [`resume`] (or [`switch`]) on `ctx`, this function "returns" a
/// second time with that resumer's value.
///
/// # Safety
///
/// `ctx` must be valid for writes. The captured continuation is only
/// meaningful while the stack frames below the capture point are alive.
#[unsafe(naked)]
pub unsafe extern "C" fn capture(ctx: *mut ExecutionContext) -> u64 {
    naked_asm!(
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], rbx",
        "mov [rdi + 0x28], rbp",
        // rsp points at the return address pushed by `call`.
        "mov [rdi + 0x30], rsp",
        "mov rax, [rsp]",
        "mov [rdi + 0x38], rax",
        "xor eax, eax",
        "ret",
    );
}

/// Jump into a captured context, handing `value` to its capture site.
///
/// # Safety
///
/// `ctx` must hold a live capture (see [`capture`]); `value` must be
/// non-zero; the target context must not have been resumed before.
#[unsafe(naked)]
pub unsafe extern "C" fn resume(ctx: *const ExecutionContext, value: u64) -> ! {
    naked_asm!(
        "mov r15, [rdi + 0x00]",
        "mov r14, [rdi + 0x08]",
        "mov r13, [rdi + 0x10]",
        "mov r12, [rdi + 0x18]",
        "mov rbx, [rdi + 0x20]",
        "mov rbp, [rdi + 0x28]",
        "mov rsp, [rdi + 0x30]",
        // The saved rsp still includes the capture call's return
        // address; complete that return by hand.
        "add rsp, 8",
        "mov rax, rsi",
        "jmp qword ptr [rdi + 0x38]",
    );
}

/// Suspend the current flow into `save` and resume `load`.
///
/// Control comes back when some later flow switches (or resumes) into
/// `save`; the suspended point observes the value 1.
///
/// # Safety
///
/// `save` must be valid for writes and `load` must hold a live capture.
/// Both pointers must stay valid for the duration of the call; callers
/// must not hold locks a resumed flow could re-take.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(save: *mut ExecutionContext, load: *const ExecutionContext) {
    naked_asm!(
        // Save the current continuation.
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], rbx",
        "mov [rdi + 0x28], rbp",
        "mov [rdi + 0x30], rsp",
        "mov rax, [rsp]",
        "mov [rdi + 0x38], rax",
        // Load the target continuation.
        "mov r15, [rsi + 0x00]",
        "mov r14, [rsi + 0x08]",
        "mov r13, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov rbx, [rsi + 0x20]",
        "mov rbp, [rsi + 0x28]",
        "mov rsp, [rsi + 0x30]",
        "add rsp, 8",
        // Resumed captures read this as the capture return value.
        "mov eax, 1",
        "jmp qword ptr [rsi + 0x38]",
    );
}

/// Transfer to ring 3.
///
/// Builds an interrupt return frame with the user selectors and IF set,
/// then `iretq`s to `entry` on `user_stack`.
///
/// # Safety
///
/// The program window mapping for the target process must be installed
/// and its image copied in; `entry` and `user_stack` must lie inside
/// the window.
pub unsafe fn enter_user(entry: u64, user_stack: u64) -> ! {
    let selectors = crate::gdt::selectors();
    let user_cs = selectors.user_code.0 as u64;
    let user_ds = selectors.user_data.0 as u64;

    unsafe {
        asm!(
            "push {ss}",
            "push {rsp}",
            // IF | reserved bit 1: the process starts with interrupts
            // on, everything else clear.
            "push {rflags}",
            "push {cs}",
            "push {rip}",
            "iretq",
            ss = in(reg) user_ds,
            rsp = in(reg) user_stack,
            rflags = in(reg) 0x202u64,
            cs = in(reg) user_cs,
            rip = in(reg) entry,
            options(noreturn),
        );
    }
}
