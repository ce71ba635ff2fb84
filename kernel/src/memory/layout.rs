//! Fixed address-space layout.
//!
//! Every placement decision in the kernel is a pure function of a PID or
//! terminal index over these constants:
//!
//! ```text
//! physical                         virtual (per scheduled process)
//! 0x000B8000  VGA text frame       0x08000000  program window (4MB)
//! 0x000B9000  terminal 0 frame     0x08048000  program image
//! 0x000BA000  terminal 1 frame     0x083FFFF0  initial user stack
//! 0x000BB000  terminal 2 frame     0x09C00000  user-visible video page
//! 0x00800000  end of kernel region
//! 0x00800000 + pid * 4MB           program frame for `pid`
//! ```

use crate::process::Pid;

/// End of the kernel's own physical region; program frames start here.
pub const KERNEL_REGION_END: u64 = 0x80_0000;

/// Size of one program window / physical program frame (4MB).
pub const PROGRAM_SIZE: u64 = 0x40_0000;

/// Virtual base of the program window (128MB).
pub const PROGRAM_WINDOW_BASE: u64 = 0x0800_0000;

/// Virtual end (exclusive) of the program window.
pub const PROGRAM_WINDOW_TOP: u64 = PROGRAM_WINDOW_BASE + PROGRAM_SIZE;

/// Offset of the program image inside the window; executables are
/// linked against `PROGRAM_WINDOW_BASE + PROGRAM_IMAGE_OFFSET`.
pub const PROGRAM_IMAGE_OFFSET: u64 = 0x4_8000;

/// Virtual address of the user-visible video memory page.
pub const USER_VIDEO_BASE: u64 = 0x9C0_0000;

/// Physical address of the live VGA text frame.
pub const VGA_TEXT_PHYS: u64 = 0xB8000;

/// Size of the video page alias (one 4KiB page).
pub const VIDEO_PAGE_SIZE: u64 = 4096;

/// Physical frame backing a process's program window.
///
/// The mapping is stable for the lifetime of the PID: slot k always
/// resolves to the same frame, across any number of suspensions.
pub fn program_frame(pid: Pid) -> u64 {
    KERNEL_REGION_END + pid.as_u64() * PROGRAM_SIZE
}

/// Physical address of the image inside a process's program frame.
pub fn program_image_phys(pid: Pid) -> u64 {
    program_frame(pid) + PROGRAM_IMAGE_OFFSET
}

/// Off-screen video frame for a terminal that is not on the display.
pub fn terminal_backing_frame(terminal: usize) -> u64 {
    VGA_TEXT_PHYS + (terminal as u64 + 1) * VIDEO_PAGE_SIZE
}

/// Whether `addr` falls inside the program window.
pub fn window_contains(addr: u64) -> bool {
    (PROGRAM_WINDOW_BASE..PROGRAM_WINDOW_TOP).contains(&addr)
}

/// Initial user stack pointer: top of the program window, 16-aligned.
pub fn initial_user_stack() -> u64 {
    PROGRAM_WINDOW_TOP - 16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_frames_are_disjoint_and_stable() {
        for k in 0..crate::process::MAX_TASKS {
            let pid = Pid(k);
            let frame = program_frame(pid);
            assert_eq!(frame, KERNEL_REGION_END + k as u64 * PROGRAM_SIZE);
            // Same PID resolves to the same frame on a later query.
            assert_eq!(program_frame(pid), frame);
            if k > 0 {
                assert_eq!(frame - program_frame(Pid(k - 1)), PROGRAM_SIZE);
            }
        }
    }

    #[test]
    fn test_window_bounds() {
        assert!(!window_contains(PROGRAM_WINDOW_BASE - 1));
        assert!(window_contains(PROGRAM_WINDOW_BASE));
        assert!(window_contains(PROGRAM_WINDOW_TOP - 1));
        assert!(!window_contains(PROGRAM_WINDOW_TOP));
        assert!(!window_contains(0));
        assert!(!window_contains(USER_VIDEO_BASE));
    }

    #[test]
    fn test_backing_frames_follow_vga() {
        assert_eq!(terminal_backing_frame(0), 0xB9000);
        assert_eq!(terminal_backing_frame(1), 0xBA000);
        assert_eq!(terminal_backing_frame(2), 0xBB000);
    }

    #[test]
    fn test_user_stack_inside_window() {
        let sp = initial_user_stack();
        assert!(window_contains(sp));
        assert_eq!(sp % 16, 0);
    }
}
