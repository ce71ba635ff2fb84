//! Process control blocks and the PCB arena.
//!
//! One fixed-size slot per PID. A slot holds the PCB itself plus an
//! 8KiB region used as that process's kernel stack: the "PCB lives at
//! the top of its own kernel stack" arrangement, expressed as an arena
//! indexed by PID rather than pointer arithmetic. A slot is never
//! deallocated; freeing a PID just clears the `active` flag and the
//! slot is rebuilt wholesale on reuse.

use core::cell::UnsafeCell;

use spin::Mutex;

use super::context::ExecutionContext;
use super::{Pid, ARG_BUFFER_SIZE, KERNEL_STACK_SIZE, MAX_DESCRIPTORS, MAX_TASKS};
use crate::vfs::{FileOps, OpenFile};

/// Kernel-resident record of one process.
pub struct Pcb {
    /// This slot's PID.
    pub pid: Pid,
    /// Parent PID; `None` marks a terminal's root shell.
    pub parent: Option<Pid>,
    /// Descriptor table. Slots 0/1 are pre-bound to the terminal device
    /// at creation and are never reassigned.
    pub descriptors: [OpenFile; MAX_DESCRIPTORS],
    /// Context of the `execute` caller; halt resumes it.
    pub saved_context: ExecutionContext,
    /// Context captured when this process itself was last suspended.
    pub current_context: ExecutionContext,
    /// Whether the slot currently backs a live process.
    pub active: bool,
    /// Verbatim argument tail from the creating command line.
    pub args: [u8; ARG_BUFFER_SIZE],
    /// Bytes used in `args` (0 when the command had no arguments).
    pub args_len: usize,
}

impl Pcb {
    /// An inactive slot.
    pub const fn empty() -> Self {
        const FREE: OpenFile = OpenFile::unused(0);
        let mut descriptors = [FREE; MAX_DESCRIPTORS];
        // Record each slot's own index; `unused` cannot do it in a
        // const array repeat.
        let mut i = 0;
        while i < MAX_DESCRIPTORS {
            descriptors[i].index = i;
            i += 1;
        }

        Pcb {
            pid: Pid(0),
            parent: None,
            descriptors,
            saved_context: ExecutionContext::empty(),
            current_context: ExecutionContext::empty(),
            active: false,
            args: [0; ARG_BUFFER_SIZE],
            args_len: 0,
        }
    }

    /// Rebuild this slot for a fresh process.
    ///
    /// Clears every descriptor, binds 0/1 to the terminal device, and
    /// stores the argument tail.
    pub fn reset(&mut self, pid: Pid, parent: Option<Pid>, args: &[u8]) {
        self.pid = pid;
        self.parent = parent;
        self.active = true;
        self.saved_context = ExecutionContext::empty();
        self.current_context = ExecutionContext::empty();

        for (i, slot) in self.descriptors.iter_mut().enumerate() {
            slot.clear();
            slot.index = i;
        }
        self.descriptors[0].bind(&crate::terminal::TERMINAL_DEVICE, 0);
        self.descriptors[1].bind(&crate::terminal::TERMINAL_DEVICE, 0);

        let n = args.len().min(ARG_BUFFER_SIZE - 1);
        self.args[..n].copy_from_slice(&args[..n]);
        self.args[n] = 0;
        self.args_len = n;
    }

    /// The stored argument tail.
    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }

    /// Bind the lowest free descriptor ≥ 2; `None` when the table is
    /// full.
    pub fn alloc_descriptor(&mut self, ops: &'static dyn FileOps, inode: u32) -> Option<usize> {
        for fd in 2..MAX_DESCRIPTORS {
            if !self.descriptors[fd].in_use {
                self.descriptors[fd].bind(ops, inode);
                return Some(fd);
            }
        }
        None
    }

    /// Whether `fd` names a bound descriptor.
    pub fn descriptor_in_use(&self, fd: usize) -> bool {
        fd < MAX_DESCRIPTORS && self.descriptors[fd].in_use
    }
}

/// One arena slot: the PCB plus the process's kernel stack.
#[repr(C, align(4096))]
struct PcbSlot {
    pcb: Mutex<Pcb>,
    stack: KernelStack,
}

impl PcbSlot {
    const fn new() -> Self {
        PcbSlot {
            pcb: Mutex::new(Pcb::empty()),
            stack: KernelStack::new(),
        }
    }
}

/// Raw kernel stack storage; the CPU writes through it while the slot's
/// process is in ring 0.
#[repr(C, align(16))]
struct KernelStack(UnsafeCell<[u8; KERNEL_STACK_SIZE]>);

impl KernelStack {
    const fn new() -> Self {
        KernelStack(UnsafeCell::new([0; KERNEL_STACK_SIZE]))
    }
}

// The stack bytes are only ever touched by the CPU as stack memory.
unsafe impl Sync for KernelStack {}

const SLOT_INIT: PcbSlot = PcbSlot::new();

/// The PCB arena, indexed by PID.
static ARENA: [PcbSlot; MAX_TASKS] = [SLOT_INIT; MAX_TASKS];

/// Run a closure with exclusive access to a PID's PCB.
pub fn with_pcb<F, R>(pid: Pid, f: F) -> R
where
    F: FnOnce(&mut Pcb) -> R,
{
    let mut guard = ARENA[pid.as_usize()].pcb.lock();
    f(&mut guard)
}

/// Top of the kernel stack reserved in a PID's slot (16-aligned).
pub fn kernel_stack_top(pid: Pid) -> u64 {
    let base = ARENA[pid.as_usize()].stack.0.get() as u64;
    (base + KERNEL_STACK_SIZE as u64) & !0xF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_binds_stdio_and_args() {
        let mut pcb = Pcb::empty();
        pcb.reset(Pid(2), Some(Pid(0)), b"arg1 arg2");

        assert!(pcb.active);
        assert_eq!(pcb.pid, Pid(2));
        assert_eq!(pcb.parent, Some(Pid(0)));
        assert!(pcb.descriptors[0].in_use);
        assert!(pcb.descriptors[1].in_use);
        assert!(!pcb.descriptors[2].in_use);
        assert_eq!(pcb.args(), b"arg1 arg2");
    }

    #[test]
    fn test_descriptor_allocation_fills_then_fails() {
        let mut pcb = Pcb::empty();
        pcb.reset(Pid(0), None, b"");

        for expected in 2..MAX_DESCRIPTORS {
            let fd = pcb
                .alloc_descriptor(&crate::fs::FILE_DEVICE, expected as u32)
                .unwrap();
            assert_eq!(fd, expected);
        }
        assert!(pcb
            .alloc_descriptor(&crate::fs::FILE_DEVICE, 0)
            .is_none());

        // Freeing one makes exactly that slot reusable.
        pcb.descriptors[4].clear();
        assert_eq!(pcb.alloc_descriptor(&crate::fs::FILE_DEVICE, 9), Some(4));
    }

    #[test]
    fn test_argument_buffer_truncation() {
        let mut pcb = Pcb::empty();
        let long = [b'a'; 200];
        pcb.reset(Pid(1), None, &long);
        assert_eq!(pcb.args_len, ARG_BUFFER_SIZE - 1);
        assert_eq!(pcb.args[ARG_BUFFER_SIZE - 1], 0);
    }

    #[test]
    fn test_stack_tops_are_distinct_and_aligned() {
        let mut tops = [0u64; MAX_TASKS];
        for k in 0..MAX_TASKS {
            tops[k] = kernel_stack_top(Pid(k));
            assert_eq!(tops[k] % 16, 0);
        }
        for a in 0..MAX_TASKS {
            for b in 0..a {
                assert_ne!(tops[a], tops[b]);
            }
        }
    }
}
