//! Process management.
//!
//! A process is a PCB slot in a fixed arena, a deterministic physical
//! program frame, and at most one execution context the scheduler may
//! resume. Creation ([`loader`]), teardown ([`exit`]) and bookkeeping
//! ([`manager`]) all operate on the same small set of fixed-capacity
//! structures; nothing here allocates.

pub mod context;
pub mod exit;
pub mod loader;
pub mod manager;
pub mod pcb;

use core::fmt;

/// Maximum number of simultaneously live processes (PID slots).
pub const MAX_TASKS: usize = 6;

/// Parallel cap on user programs started by `execute` with a parent.
/// Root shells are exempt. Enforced independently of [`MAX_TASKS`].
pub const MAX_USER_PROGRAMS: usize = 3;

/// Descriptor table size per process.
pub const MAX_DESCRIPTORS: usize = 8;

/// Argument buffer size; matches the terminal line buffer.
pub const ARG_BUFFER_SIZE: usize = 128;

/// Kernel stack bytes reserved in each PCB slot.
pub const KERNEL_STACK_SIZE: usize = 8192;

/// Process identifier: an index into the PCB arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(pub usize);

impl Pid {
    /// Raw slot index.
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// Slot index widened for address arithmetic.
    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
