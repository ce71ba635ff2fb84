//! GDT, TSS and segment selectors.
//!
//! Long mode needs almost none of the segmentation machinery, but three
//! pieces still matter here:
//!
//! - ring 0 / ring 3 code and data descriptors, laid out so that
//!   `sysretq` derives the user selectors from the STAR base,
//! - a TSS whose `rsp0` is retargeted at every process switch (each
//!   process brings its own kernel stack),
//! - a dedicated IST stack for double faults.

use core::cell::UnsafeCell;

use lazy_static::lazy_static;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

/// IST index used by the double-fault handler.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

/// Stack for the double-fault handler (static: there is no kernel heap).
const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 5;

struct IstStack(UnsafeCell<[u8; DOUBLE_FAULT_STACK_SIZE]>);

// Handed to the CPU as a raw stack, never borrowed.
unsafe impl Sync for IstStack {}

static DOUBLE_FAULT_STACK: IstStack = IstStack(UnsafeCell::new([0; DOUBLE_FAULT_STACK_SIZE]));

struct TssCell(UnsafeCell<TaskStateSegment>);

// Mutated only with interrupts disabled on a single core.
unsafe impl Sync for TssCell {}

static TSS: TssCell = TssCell(UnsafeCell::new(TaskStateSegment::new()));

lazy_static! {
    /// Global Descriptor Table and the selectors it hands out.
    ///
    /// Order is load-bearing: `sysretq` computes SS = STAR.base + 8 and
    /// CS = STAR.base + 16, so user data must sit directly below user
    /// code.
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();

        let kernel_code = gdt.append(Descriptor::kernel_code_segment());
        let kernel_data = gdt.append(Descriptor::kernel_data_segment());
        let user_data = gdt.append(Descriptor::user_data_segment());
        let user_code = gdt.append(Descriptor::user_code_segment());

        // SAFETY: TSS is a static; the reference lives for 'static. The
        // descriptor snapshot taken here covers base/limit only, which
        // never change; only rsp0 is rewritten later.
        let tss = gdt.append(Descriptor::tss_segment(unsafe { &*TSS.0.get() }));

        (gdt, Selectors {
            kernel_code,
            kernel_data,
            user_data,
            user_code,
            tss,
        })
    };
}

/// Segment selectors handed out by [`init`].
#[derive(Debug, Clone, Copy)]
pub struct Selectors {
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub user_data: SegmentSelector,
    pub user_code: SegmentSelector,
    tss: SegmentSelector,
}

/// Selectors for the rest of the kernel (user-mode transfer, MSR setup).
pub fn selectors() -> Selectors {
    GDT.1
}

/// Load the GDT and TSS.
///
/// Must run before the IDT is installed so the double-fault IST entry
/// resolves.
pub fn init() {
    use x86_64::instructions::segmentation::{Segment, CS, SS};
    use x86_64::instructions::tables::load_tss;

    // SAFETY: single-threaded boot path, nothing else touches the TSS
    // before `load_tss`.
    unsafe {
        let tss = &mut *TSS.0.get();
        let stack_base = VirtAddr::from_ptr(DOUBLE_FAULT_STACK.0.get());
        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] =
            stack_base + DOUBLE_FAULT_STACK_SIZE as u64;
    }

    GDT.0.load();

    unsafe {
        CS::set_reg(GDT.1.kernel_code);
        SS::set_reg(GDT.1.kernel_data);
        load_tss(GDT.1.tss);
    }

    crate::serial_println!("[GDT] Descriptor table loaded, TSS installed");
}

/// Point the ring-0 stack for privilege transitions at `top`.
///
/// Called on every process switch: interrupts arriving from ring 3 must
/// land on the kernel stack of whichever process is being resumed.
pub fn set_kernel_stack(top: u64) {
    // SAFETY: single core, callers hold interrupts disabled around the
    // switch this accompanies.
    unsafe {
        (*TSS.0.get()).privilege_stack_table[0] = VirtAddr::new(top);
    }
}
