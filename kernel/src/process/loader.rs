//! Program loader: the `execute` path and root-shell creation.
//!
//! Loading is all-or-nothing: every check that can fail (both process
//! caps, command parsing, name resolution, the executable header) runs
//! before a PID or mapping is committed. Past the image copy, creation
//! always reaches user mode.

use x86_64::instructions::interrupts;

use super::context::{self, ExecutionContext};
use super::{manager, pcb, Pid};
use crate::memory::{self, layout};
use crate::{fs, gdt, syscall};

/// Exit status reported when a process dies on a CPU exception rather
/// than a `halt` call. One past the largest normal status byte.
pub const ABNORMAL_EXIT: u32 = 256;

/// Bytes of the executable header the loader inspects.
pub const HEADER_LEN: usize = 30;

/// Executable signature at the start of every program image.
const MAGIC: [u8; 4] = [0x7F, 0x45, 0x4C, 0x46];

/// Offset of the little-endian entry address inside the header.
const ENTRY_OFFSET: usize = 24;

/// Loader failures. All of them surface as -1 at the syscall boundary
/// and leave no partial state behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// PID table full or the parallel user-program cap reached.
    TooManyProcesses,
    /// Command contained no program name.
    EmptyCommand,
    /// Program name did not resolve.
    NotFound,
    /// Header missing the executable signature.
    NotExecutable,
    /// Slot table raced to full between check and claim.
    NoFreePid,
}

/// Split a command line into the program name and the verbatim
/// argument tail.
///
/// Leading spaces are skipped, the name runs to the first space, and
/// the tail begins at the next non-space byte, kept as typed.
pub fn split_command(command: &[u8]) -> Result<(&[u8], &[u8]), ExecError> {
    let start = command
        .iter()
        .position(|&b| b != b' ')
        .ok_or(ExecError::EmptyCommand)?;
    let rest = &command[start..];

    let name_end = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return Err(ExecError::EmptyCommand);
    }

    let tail = &rest[name_end..];
    let args_start = tail
        .iter()
        .position(|&b| b != b' ')
        .unwrap_or(tail.len());
    Ok((name, &tail[args_start..]))
}

/// Validate an executable header and extract its entry address.
pub fn parse_entry_point(header: &[u8]) -> Result<u32, ExecError> {
    if header.len() < HEADER_LEN || header[..4] != MAGIC {
        return Err(ExecError::NotExecutable);
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&header[ENTRY_OFFSET..ENTRY_OFFSET + 4]);
    Ok(u32::from_le_bytes(bytes))
}

/// Resolve and validate a program, returning its inode and entry
/// address. No state is committed by this.
fn validate_program(name: &[u8]) -> Result<(u32, u32), ExecError> {
    let dentry = fs::lookup(name).map_err(|_| ExecError::NotFound)?;

    let mut header = [0u8; HEADER_LEN];
    let n = fs::read_at(dentry.inode, 0, &mut header).map_err(|_| ExecError::NotExecutable)?;
    let entry = parse_entry_point(&header[..n])?;
    Ok((dentry.inode, entry))
}

/// Stream the full program image into the window frame of `pid`.
fn copy_image(pid: Pid, inode: u32) {
    let capacity = (layout::PROGRAM_SIZE - layout::PROGRAM_IMAGE_OFFSET) as usize;
    let dst_phys = layout::program_image_phys(pid);

    // SAFETY: the frame belongs exclusively to `pid`, whose slot was
    // claimed above; nothing else writes it until the PID is freed.
    let dst =
        unsafe { core::slice::from_raw_parts_mut(memory::phys_to_virt(dst_phys), capacity) };

    let copied = fs::read_at(inode, 0, dst).unwrap_or(0);
    crate::debug!("[PROC] image for pid {}: {} bytes", pid, copied);
}

/// Retarget privilege-transition stacks at a PID's kernel stack.
fn install_kernel_stack(pid: Pid) {
    let top = pcb::kernel_stack_top(pid);
    gdt::set_kernel_stack(top);
    syscall::set_kernel_stack(top);
}

/// Start a program on the scheduled terminal and run it to completion.
///
/// Returns only when the new process (or a descendant chain ending in
/// it) halts: 0..=255 for a normal exit, [`ABNORMAL_EXIT`] when the
/// process died on an exception. Errors are reported before any PID or
/// mapping has been touched.
pub fn execute(command: &[u8]) -> Result<u32, ExecError> {
    manager::with_manager(|m| {
        // Two independent limits; each is checked on its own.
        if !m.has_free_slot() || !m.can_start_user_program() {
            Err(ExecError::TooManyProcesses)
        } else {
            Ok(())
        }
    })?;

    let (name, args) = split_command(command)?;
    let (inode, entry) = validate_program(name)?;

    let parent = manager::current_pid();
    let terminal = manager::scheduled_terminal();

    // Point of commitment: claim the PID with interrupts masked so a
    // tick cannot observe a half-claimed slot.
    let pid = interrupts::without_interrupts(|| manager::with_manager(|m| m.allocate_pid()))
        .ok_or(ExecError::NoFreePid)?;

    memory::paging::map_process(pid);
    pcb::with_pcb(pid, |p| p.reset(pid, parent, args));
    copy_image(pid, inode);

    interrupts::without_interrupts(|| {
        manager::with_manager(|m| {
            m.user_program_started();
            m.terminal_mut(terminal).active = Some(pid);
            m.set_current(pid);
        })
    });
    install_kernel_stack(pid);

    crate::info!(
        "[PROC] pid {} running '{}' on terminal {}",
        pid,
        core::str::from_utf8(name).unwrap_or("?"),
        terminal
    );

    // Capture this very point; halt resumes it with status + 1.
    let mut caller = ExecutionContext::empty();
    let resumed = unsafe { context::capture(&mut caller) };
    if resumed != 0 {
        return Ok((resumed - 1) as u32);
    }
    pcb::with_pcb(pid, |p| p.saved_context = caller);

    // SAFETY: mapping installed, image copied, entry and stack lie in
    // the window.
    unsafe { context::enter_user(entry as u64, layout::initial_user_stack()) }
}

/// Create a terminal's root shell and transfer to it. Never returns.
///
/// Invoked at boot for terminal 0, by the scheduler on first touch of
/// the other terminals, and by halt when a root shell exits. Root
/// shells have no parent and are exempt from the user-program cap.
pub fn spawn_root_shell(terminal: usize) -> ! {
    let (inode, entry) = match validate_program(b"shell") {
        Ok(v) => v,
        Err(e) => {
            crate::error!("[PROC] cannot start shell on terminal {}: {:?}", terminal, e);
            crate::interrupts::hlt_loop();
        }
    };

    let pid = match interrupts::without_interrupts(|| manager::with_manager(|m| m.allocate_pid()))
    {
        Some(pid) => pid,
        None => {
            crate::error!("[PROC] no free PID for shell on terminal {}", terminal);
            crate::interrupts::hlt_loop();
        }
    };

    memory::paging::map_process(pid);
    pcb::with_pcb(pid, |p| p.reset(pid, None, b""));
    copy_image(pid, inode);

    interrupts::without_interrupts(|| {
        manager::with_manager(|m| {
            let session = m.terminal_mut(terminal);
            session.shell = Some(pid);
            session.active = Some(pid);
            m.set_scheduled_terminal(terminal);
            m.set_current(pid);
        })
    });
    install_kernel_stack(pid);

    crate::info!("[PROC] root shell pid {} on terminal {}", pid, terminal);

    // SAFETY: as in `execute`.
    unsafe { context::enter_user(entry as u64, layout::initial_user_stack()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_name_and_tail() {
        let (name, args) = split_command(b"cat frame0.txt").unwrap();
        assert_eq!(name, b"cat");
        assert_eq!(args, b"frame0.txt");

        let (name, args) = split_command(b"  shell").unwrap();
        assert_eq!(name, b"shell");
        assert_eq!(args, b"");

        // The tail is verbatim past the first run of spaces.
        let (_, args) = split_command(b"grep  a  b ").unwrap();
        assert_eq!(args, b"a  b ");
    }

    #[test]
    fn test_split_command_rejects_blank() {
        assert_eq!(split_command(b""), Err(ExecError::EmptyCommand));
        assert_eq!(split_command(b"    "), Err(ExecError::EmptyCommand));
    }

    #[test]
    fn test_parse_entry_point() {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[24..28].copy_from_slice(&0x0804_8000u32.to_le_bytes());
        assert_eq!(parse_entry_point(&header), Ok(0x0804_8000));
    }

    #[test]
    fn test_parse_entry_point_rejects_bad_headers() {
        // Wrong signature
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(b"\x7fBAD");
        assert_eq!(parse_entry_point(&header), Err(ExecError::NotExecutable));

        // Too short (file smaller than the header)
        assert_eq!(parse_entry_point(&MAGIC), Err(ExecError::NotExecutable));
    }
}
