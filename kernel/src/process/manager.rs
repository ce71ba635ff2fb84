//! Process slot table and per-terminal records.
//!
//! A single manager object owns every piece of cross-process state the
//! original design kept in free-floating globals: the PID in-use map,
//! the two process-count limits, the per-terminal sessions, which
//! terminal is scheduled, and which process is current. Call chains go
//! through [`with_manager`] (or the small read-only accessors) instead
//! of reading globals.

use spin::Mutex;

use super::context::ExecutionContext;
use super::{Pid, MAX_TASKS, MAX_USER_PROGRAMS};
use crate::terminal::TERMINAL_COUNT;

/// Per-terminal process bookkeeping.
pub struct TerminalSession {
    /// PID of this terminal's root shell, once created.
    pub shell: Option<Pid>,
    /// PID currently scheduled as this terminal's foreground process.
    pub active: Option<Pid>,
    /// Context to resume this terminal's process stream with.
    pub saved_context: ExecutionContext,
}

impl TerminalSession {
    const fn new() -> Self {
        TerminalSession {
            shell: None,
            active: None,
            saved_context: ExecutionContext::empty(),
        }
    }
}

/// The process manager.
pub struct ProcessManager {
    in_use: [bool; MAX_TASKS],
    task_count: usize,
    user_program_count: usize,
    terminals: [TerminalSession; TERMINAL_COUNT],
    scheduled_terminal: usize,
    current: Option<Pid>,
}

impl ProcessManager {
    /// An empty manager: no processes, terminal 0 scheduled.
    pub const fn new() -> Self {
        const SESSION: TerminalSession = TerminalSession::new();
        ProcessManager {
            in_use: [false; MAX_TASKS],
            task_count: 0,
            user_program_count: 0,
            terminals: [SESSION; TERMINAL_COUNT],
            scheduled_terminal: 0,
            current: None,
        }
    }

    // ── PID slot table ──────────────────────────────────────────

    /// Claim the lowest free PID; `None` when the table is full.
    pub fn allocate_pid(&mut self) -> Option<Pid> {
        for (i, used) in self.in_use.iter_mut().enumerate() {
            if !*used {
                *used = true;
                self.task_count += 1;
                return Some(Pid(i));
            }
        }
        None
    }

    /// Release a PID for reuse.
    pub fn free_pid(&mut self, pid: Pid) {
        let slot = &mut self.in_use[pid.as_usize()];
        if *slot {
            *slot = false;
            self.task_count -= 1;
        }
    }

    /// Whether `pid` is currently claimed.
    pub fn pid_in_use(&self, pid: Pid) -> bool {
        self.in_use[pid.as_usize()]
    }

    /// Number of live processes.
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Whether the PID table has a free slot.
    pub fn has_free_slot(&self) -> bool {
        self.task_count < MAX_TASKS
    }

    // ── Parallel user-program cap ───────────────────────────────

    /// Whether another child program may start. Independent of the PID
    /// cap.
    pub fn can_start_user_program(&self) -> bool {
        self.user_program_count < MAX_USER_PROGRAMS
    }

    /// Record a started child program.
    pub fn user_program_started(&mut self) {
        self.user_program_count += 1;
    }

    /// Record a finished child program.
    pub fn user_program_finished(&mut self) {
        if self.user_program_count > 0 {
            self.user_program_count -= 1;
        }
    }

    /// Number of running child programs.
    pub fn user_program_count(&self) -> usize {
        self.user_program_count
    }

    // ── Current process / scheduled terminal ────────────────────

    /// PID whose PCB is logically current.
    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    /// Make `pid` the current process.
    pub fn set_current(&mut self, pid: Pid) {
        self.current = Some(pid);
    }

    /// Terminal whose process stream is executing.
    pub fn scheduled_terminal(&self) -> usize {
        self.scheduled_terminal
    }

    /// Move scheduling to `terminal`.
    pub fn set_scheduled_terminal(&mut self, terminal: usize) {
        self.scheduled_terminal = terminal;
    }

    /// The next terminal in fixed cyclic order.
    pub fn next_terminal(&self) -> usize {
        (self.scheduled_terminal + 1) % TERMINAL_COUNT
    }

    // ── Terminal sessions ───────────────────────────────────────

    /// Read access to a terminal's session record.
    pub fn terminal(&self, index: usize) -> &TerminalSession {
        &self.terminals[index]
    }

    /// Write access to a terminal's session record.
    pub fn terminal_mut(&mut self, index: usize) -> &mut TerminalSession {
        &mut self.terminals[index]
    }
}

/// The global manager instance.
static MANAGER: Mutex<ProcessManager> = Mutex::new(ProcessManager::new());

/// Run a closure with the manager locked.
///
/// Callers must not suspend or transfer control while inside the
/// closure; extract whatever the transfer needs first, then drop the
/// lock (see the scheduler for the pattern).
pub fn with_manager<F, R>(f: F) -> R
where
    F: FnOnce(&mut ProcessManager) -> R,
{
    let mut guard = MANAGER.lock();
    f(&mut guard)
}

/// PID of the current process.
pub fn current_pid() -> Option<Pid> {
    with_manager(|m| m.current())
}

/// Terminal whose process stream is executing.
pub fn scheduled_terminal() -> usize {
    with_manager(|m| m.scheduled_terminal())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_free_pid_and_reuse() {
        let mut m = ProcessManager::new();

        let a = m.allocate_pid().unwrap();
        let b = m.allocate_pid().unwrap();
        assert_eq!(a, Pid(0));
        assert_eq!(b, Pid(1));

        m.free_pid(a);
        // Freed PID is the lowest again and gets reused.
        assert_eq!(m.allocate_pid(), Some(Pid(0)));
        assert_eq!(m.allocate_pid(), Some(Pid(2)));
        assert_eq!(m.task_count(), 3);
    }

    #[test]
    fn test_pid_exhaustion_and_recovery() {
        let mut m = ProcessManager::new();
        let mut pids = [Pid(0); MAX_TASKS];
        for slot in pids.iter_mut() {
            *slot = m.allocate_pid().unwrap();
        }
        // No two live PIDs are equal.
        for i in 0..MAX_TASKS {
            for j in 0..i {
                assert_ne!(pids[i], pids[j]);
            }
        }
        assert!(m.allocate_pid().is_none());
        assert!(!m.has_free_slot());

        m.free_pid(pids[3]);
        assert_eq!(m.allocate_pid(), Some(Pid(3)));
    }

    #[test]
    fn test_double_free_is_harmless() {
        let mut m = ProcessManager::new();
        let pid = m.allocate_pid().unwrap();
        m.free_pid(pid);
        m.free_pid(pid);
        assert_eq!(m.task_count(), 0);
    }

    #[test]
    fn test_user_program_cap_independent_of_pids() {
        let mut m = ProcessManager::new();
        for _ in 0..MAX_USER_PROGRAMS {
            assert!(m.can_start_user_program());
            m.user_program_started();
        }
        assert!(!m.can_start_user_program());
        // PID slots can still be free while the program cap is hit.
        assert!(m.has_free_slot());

        m.user_program_finished();
        assert!(m.can_start_user_program());
    }

    #[test]
    fn test_terminal_cycle_order() {
        let mut m = ProcessManager::new();
        assert_eq!(m.scheduled_terminal(), 0);

        let mut seen = [0usize; 6];
        for slot in seen.iter_mut() {
            let next = m.next_terminal();
            m.set_scheduled_terminal(next);
            *slot = next;
        }
        assert_eq!(seen, [1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_terminal_sessions_start_empty() {
        let m = ProcessManager::new();
        for t in 0..TERMINAL_COUNT {
            assert!(m.terminal(t).shell.is_none());
            assert!(m.terminal(t).active.is_none());
        }
    }
}
