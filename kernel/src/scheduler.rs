//! Round-robin terminal scheduler.
//!
//! Driven exclusively by the PIT interrupt. Each tick suspends the
//! running terminal's process stream and resumes the next terminal's,
//! in fixed 0 → 1 → 2 → 0 order. A terminal touched for the first time
//! gets its root shell created instead of a switch; creation itself
//! transfers control. Before the first process exists, ticks do
//! nothing.
//!
//! Every resume reinstalls the target process's window mapping,
//! re-derives the video alias against the displayed terminal, and
//! retargets the privilege-transition stacks, so no process ever runs
//! an instruction through a stale translation.

use crate::memory::paging;
use crate::process::context::{self, ExecutionContext};
use crate::process::{loader, manager, pcb, Pid};
use crate::{gdt, syscall, terminal};

/// What a tick decided to do, with the context pointers extracted
/// while the manager lock was held.
enum Tick {
    /// No process exists yet; ignore the tick.
    Idle,
    /// Suspend `save` and create the first shell on `to`.
    Spawn {
        to: usize,
        save: *mut ExecutionContext,
    },
    /// Suspend `save` and resume `to`'s process stream.
    Switch {
        to: usize,
        next_pid: Pid,
        save: *mut ExecutionContext,
        load: *const ExecutionContext,
    },
}

/// Timer-interrupt entry point.
///
/// Runs with interrupts masked for its whole duration; the handler has
/// already acknowledged the PIC. The pointers extracted under the lock
/// stay valid after it drops: they index fixed manager-owned slots, and
/// nothing else can run on this core until the switch completes.
pub fn timer_tick() {
    let tick = manager::with_manager(|m| {
        if m.task_count() == 0 {
            return Tick::Idle;
        }

        let from = m.scheduled_terminal();
        let to = m.next_terminal();
        let save = &mut m.terminal_mut(from).saved_context as *mut ExecutionContext;

        match m.terminal(to).active {
            None => Tick::Spawn { to, save },
            Some(next_pid) => {
                let load = &m.terminal(to).saved_context as *const ExecutionContext;
                Tick::Switch {
                    to,
                    next_pid,
                    save,
                    load,
                }
            }
        }
    });

    match tick {
        Tick::Idle => {}

        Tick::Spawn { to, save } => {
            // First touch: park the current stream, then bring the new
            // terminal up. The capture returns a second time when a
            // later tick switches back here.
            let resumed = unsafe { context::capture(save) };
            if resumed != 0 {
                return;
            }
            loader::spawn_root_shell(to)
        }

        Tick::Switch {
            to,
            next_pid,
            save,
            load,
        } => {
            manager::with_manager(|m| {
                m.set_scheduled_terminal(to);
                m.set_current(next_pid);
            });

            // The resumed process must come back through its own
            // translations and stacks.
            paging::map_process(next_pid);
            paging::alias_video(terminal::displayed(), to);
            let top = pcb::kernel_stack_top(next_pid);
            gdt::set_kernel_stack(top);
            syscall::set_kernel_stack(top);

            // SAFETY: `load` was captured when `to`'s stream was last
            // suspended (or parked by the spawn path); `save` is this
            // terminal's slot. Single core, interrupts masked.
            unsafe { context::switch(save, load) };
            // Back on this terminal; unwind into the interrupt frame.
        }
    }
}
