//! Process termination.
//!
//! `terminate` unwinds the current process: descriptors are closed, the
//! PCB deactivated, the PID recycled. A root shell is replaced in
//! place; a started terminal never sits without one. Any other process
//! hands control back to the context its parent captured in `execute`,
//! carrying the exit status.

use x86_64::instructions::interrupts;

use super::{context, loader, manager, pcb, MAX_DESCRIPTORS};

/// Terminate the current process with `status`. Never returns.
///
/// `status` is the full widened domain: 0..=255 from `halt`,
/// [`loader::ABNORMAL_EXIT`] from the exception handlers.
pub fn terminate(status: u32) -> ! {
    let pid = manager::current_pid().expect("terminate with no current process");
    let terminal = manager::scheduled_terminal();

    // Close every non-protected descriptor and deactivate the slot.
    let parent = pcb::with_pcb(pid, |p| {
        for fd in 2..MAX_DESCRIPTORS {
            if p.descriptors[fd].in_use {
                if let Some(ops) = p.descriptors[fd].ops {
                    let mut slot = p.descriptors[fd];
                    let _ = ops.close(&mut slot);
                }
                p.descriptors[fd].clear();
            }
        }
        p.active = false;
        p.parent
    });

    crate::info!("[PROC] pid {} exited with status {}", pid, status);

    let parent_pid = match parent {
        Some(parent_pid) => parent_pid,
        None => {
            // Root shell: recycle the PID and restart the shell in
            // place. Nothing is resumed; the terminal's process
            // stream starts over.
            interrupts::without_interrupts(|| {
                manager::with_manager(|m| {
                    m.free_pid(pid);
                    let session = m.terminal_mut(terminal);
                    session.shell = None;
                    session.active = None;
                })
            });
            loader::spawn_root_shell(terminal)
        }
    };

    interrupts::without_interrupts(|| {
        manager::with_manager(|m| {
            m.free_pid(pid);
            m.user_program_finished();
            m.set_current(parent_pid);
            m.terminal_mut(terminal).active = Some(parent_pid);
        })
    });

    // Reinstall the parent's world: window mapping and kernel stack.
    crate::memory::paging::map_process(parent_pid);
    let top = pcb::kernel_stack_top(parent_pid);
    crate::gdt::set_kernel_stack(top);
    crate::syscall::set_kernel_stack(top);

    let parent_context = pcb::with_pcb(parent_pid, |p| p.saved_context);

    // SAFETY: the parent captured this context in `execute` and has
    // been suspended beneath it ever since; this is the single resume.
    // Status is shifted by one so the capture site sees non-zero.
    unsafe { context::resume(&parent_context, status as u64 + 1) }
}
