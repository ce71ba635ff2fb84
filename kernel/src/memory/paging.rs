//! Address-space manager.
//!
//! One shared set of page tables serves every process: the program
//! window translation is rewritten in place whenever a different process
//! is scheduled, and the user-visible video page is re-aimed on every
//! switch. Both rewrites are followed by a full TLB flush before any
//! code can run through the new mapping.
//!
//! The table frames themselves are statically allocated (there is no
//! frame allocator); only the leaf entries ever change:
//!
//! ```text
//! L4[0] -> LOW_L3 -> LOW_L2[64..=65] -> program frame (2x 2MiB, per PID)
//!                    LOW_L2[78]      -> VIDEO_L1[0] -> VGA or backing frame
//! ```

use core::cell::UnsafeCell;

use x86_64::instructions::interrupts;
use x86_64::instructions::tlb;
use x86_64::registers::control::Cr3;
use x86_64::structures::paging::{OffsetPageTable, PageTable, PageTableFlags, Translate};
use x86_64::{PhysAddr, VirtAddr};

use super::layout;
use crate::process::Pid;

/// L2 slot of the first 2MiB half of the program window.
const WINDOW_L2_INDEX: usize = (layout::PROGRAM_WINDOW_BASE >> 21) as usize;

/// L2 slot holding the video page table.
const VIDEO_L2_INDEX: usize = (layout::USER_VIDEO_BASE >> 21) as usize;

struct TableCell(UnsafeCell<PageTable>);

// Mutated only under `interrupts::without_interrupts` on a single core.
unsafe impl Sync for TableCell {}

static LOW_L3: TableCell = TableCell(UnsafeCell::new(PageTable::new()));
static LOW_L2: TableCell = TableCell(UnsafeCell::new(PageTable::new()));
static VIDEO_L1: TableCell = TableCell(UnsafeCell::new(PageTable::new()));

/// Flags for every user-reachable table and leaf entry.
fn user_flags() -> PageTableFlags {
    PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE
}

/// Physical address of a kernel static, resolved through the live
/// page tables.
fn static_phys(ptr: *const PageTable) -> PhysAddr {
    let offset = VirtAddr::new(super::phys_offset());
    let (l4_frame, _) = Cr3::read();
    let l4 = super::phys_to_virt(l4_frame.start_address().as_u64()) as *mut PageTable;

    // SAFETY: the active L4 is mapped through the physical offset; we
    // only translate, never modify, through this view.
    let mapper = unsafe { OffsetPageTable::new(&mut *l4, offset) };
    mapper
        .translate_addr(VirtAddr::from_ptr(ptr))
        .expect("kernel static must be mapped")
}

/// Wire the static low-half tables into the active address space.
///
/// Idempotent only in the sense that it must run exactly once, before
/// the first `map_process`.
pub fn init() {
    interrupts::without_interrupts(|| {
        let l3_phys = static_phys(LOW_L3.0.get());
        let l2_phys = static_phys(LOW_L2.0.get());
        let l1_phys = static_phys(VIDEO_L1.0.get());

        let (l4_frame, _) = Cr3::read();
        // SAFETY: single core, interrupts off; these tables are only
        // ever touched from this module.
        unsafe {
            let l4 = &mut *(super::phys_to_virt(l4_frame.start_address().as_u64())
                as *mut PageTable);
            assert!(
                l4[0].is_unused(),
                "low half of the address space already claimed"
            );
            l4[0].set_addr(l3_phys, user_flags());

            let l3 = &mut *LOW_L3.0.get();
            l3[0].set_addr(l2_phys, user_flags());

            let l2 = &mut *LOW_L2.0.get();
            l2[VIDEO_L2_INDEX].set_addr(l1_phys, user_flags());
        }

        flush_tlb();
    });

    crate::serial_println!(
        "[PAGE] Program window at {:#x}, video alias at {:#x}",
        layout::PROGRAM_WINDOW_BASE,
        layout::USER_VIDEO_BASE
    );
}

/// Install the program-window translation for `pid`.
///
/// The window's two 2MiB leaves are pointed at the PID's deterministic
/// physical frame, present / writable / user. Must be called before any
/// instruction of the process runs, and again on every resume.
///
/// Calling this with a PID outside the slot table is a contract
/// violation upstream, not a recoverable condition here.
pub fn map_process(pid: Pid) {
    let frame = layout::program_frame(pid);
    let flags = user_flags() | PageTableFlags::HUGE_PAGE;

    interrupts::without_interrupts(|| {
        // SAFETY: single core, interrupts off.
        unsafe {
            let l2 = &mut *LOW_L2.0.get();
            l2[WINDOW_L2_INDEX].set_addr(PhysAddr::new(frame), flags);
            l2[WINDOW_L2_INDEX + 1].set_addr(PhysAddr::new(frame + 0x20_0000), flags);
        }
        flush_tlb();
    });
}

/// Re-aim the user-visible video page.
///
/// When the scheduled terminal is the one on the display, the page
/// aliases the live VGA frame; otherwise it aliases that terminal's
/// off-screen frame, so background writes stay invisible.
pub fn alias_video(foreground_terminal: usize, scheduled_terminal: usize) {
    let frame = if foreground_terminal == scheduled_terminal {
        layout::VGA_TEXT_PHYS
    } else {
        layout::terminal_backing_frame(scheduled_terminal)
    };

    interrupts::without_interrupts(|| {
        // SAFETY: single core, interrupts off.
        unsafe {
            let l1 = &mut *VIDEO_L1.0.get();
            l1[0].set_addr(PhysAddr::new(frame), user_flags());
        }
        flush_tlb();
    });
}

/// Drop every cached translation.
pub fn flush_tlb() {
    tlb::flush_all();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_and_video_share_low_gigabyte() {
        // Both live under L4[0] / L3[0]; the install path relies on it.
        assert!(layout::PROGRAM_WINDOW_BASE >> 30 == 0);
        assert!(layout::USER_VIDEO_BASE >> 30 == 0);
        assert_eq!(WINDOW_L2_INDEX, 64);
        assert_eq!(VIDEO_L2_INDEX, 78);
        // The video slot must not collide with the window's two leaves.
        assert!(VIDEO_L2_INDEX > WINDOW_L2_INDEX + 1);
    }
}
