//! Physical memory access.
//!
//! The bootloader maps all of physical memory at a fixed virtual offset;
//! this module records that offset and hands out virtual pointers to
//! physical frames. Frame placement itself is fully deterministic (see
//! [`layout`]); there is no runtime frame allocator.

pub mod layout;
pub mod paging;

use core::sync::atomic::{AtomicU64, Ordering};

/// Physical memory offset (set during kernel init).
static PHYS_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Record the physical memory offset reported by the bootloader.
pub fn init(phys_offset: u64) {
    assert!(phys_offset != 0, "physical memory offset must be non-zero");
    PHYS_OFFSET.store(phys_offset, Ordering::Release);
    crate::serial_println!("[MEM ] Physical memory mapped at {:#x}", phys_offset);
}

/// The stored physical memory offset.
pub fn phys_offset() -> u64 {
    PHYS_OFFSET.load(Ordering::Acquire)
}

/// Virtual pointer to a physical address, through the offset mapping.
pub fn phys_to_virt(phys: u64) -> *mut u8 {
    (phys_offset() + phys) as *mut u8
}

/// Copy bytes into physical memory through the offset mapping.
///
/// # Safety
///
/// `phys..phys + data.len()` must lie inside a frame the caller owns;
/// nothing else may alias it concurrently.
pub unsafe fn write_phys(phys: u64, data: &[u8]) {
    let dst = phys_to_virt(phys);
    unsafe {
        core::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }
}
