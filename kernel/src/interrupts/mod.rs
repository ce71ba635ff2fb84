//! Interrupt handling subsystem.
//!
//! Sets up the IDT and routes the three hardware interrupts this kernel
//! lives on:
//!
//! - **PIT (IRQ0)**: the preemption tick; the only place a process
//!   switch ever starts.
//! - **Keyboard (IRQ1)**: scancode intake for the displayed terminal.
//! - **RTC (IRQ8)**: completion signal for blocked RTC reads.
//!
//! CPU exceptions raised from ring 3 terminate the offending process
//! with the abnormal-exit status; exceptions from ring 0 are kernel
//! bugs and panic.

pub mod pic;

use lazy_static::lazy_static;
use x86_64::registers::control::Cr2;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::PrivilegeLevel;

use crate::gdt;

/// Interrupt vector numbers for the hardware lines in use.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    /// PIT channel 0 (IRQ 0).
    Timer = pic::PIC1_OFFSET,
    /// PS/2 keyboard (IRQ 1).
    Keyboard = pic::PIC1_OFFSET + 1,
    /// CMOS real-time clock (IRQ 8).
    Rtc = pic::PIC2_OFFSET,
}

impl InterruptIndex {
    fn as_u8(self) -> u8 {
        self as u8
    }
}

lazy_static! {
    /// The interrupt descriptor table.
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        // CPU exceptions
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);

        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
        }

        // Hardware interrupts
        idt[InterruptIndex::Timer.as_u8()].set_handler_fn(timer_interrupt_handler);
        idt[InterruptIndex::Keyboard.as_u8()].set_handler_fn(keyboard_interrupt_handler);
        idt[InterruptIndex::Rtc.as_u8()].set_handler_fn(rtc_interrupt_handler);

        idt
    };
}

/// Load the IDT and bring up the PIC with all lines masked.
pub fn init() {
    IDT.load();
    pic::init();
    crate::serial_println!("[IDT ] Interrupt descriptor table loaded");
}

/// Enable hardware interrupts.
pub fn enable() {
    x86_64::instructions::interrupts::enable();
}

/// Run a closure with interrupts disabled.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    x86_64::instructions::interrupts::without_interrupts(f)
}

/// Suspend the CPU until any interrupt fires, then mask again.
///
/// This is the blocking primitive for device reads: the caller re-checks
/// its completion condition after every wakeup. It never hands the CPU
/// to another process by itself; only the timer interrupt that may
/// arrive during the halt does that.
pub fn halt_until_interrupt() {
    x86_64::instructions::interrupts::enable_and_hlt();
    x86_64::instructions::interrupts::disable();
}

/// Halt loop for contexts that have nothing left to run.
pub fn hlt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

/// Whether the interrupted code was running in ring 3.
fn from_user_mode(stack_frame: &InterruptStackFrame) -> bool {
    stack_frame.code_segment.rpl() == PrivilegeLevel::Ring3
}

/// Kill the current process after a user-mode fault.
fn fault_current_process(what: &str, stack_frame: &InterruptStackFrame) -> ! {
    crate::error!(
        "{} in user mode at {:#x}, terminating process",
        what,
        stack_frame.instruction_pointer.as_u64()
    );
    crate::process::exit::terminate(crate::process::loader::ABNORMAL_EXIT)
}

// Exception handlers

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    if from_user_mode(&stack_frame) {
        fault_current_process("DIVIDE ERROR", &stack_frame);
    }
    panic!("EXCEPTION: DIVIDE ERROR\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    crate::serial_println!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    if from_user_mode(&stack_frame) {
        fault_current_process("INVALID OPCODE", &stack_frame);
    }
    panic!("EXCEPTION: INVALID OPCODE\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    if from_user_mode(&stack_frame) {
        fault_current_process("GENERAL PROTECTION FAULT", &stack_frame);
    }
    panic!(
        "EXCEPTION: GENERAL PROTECTION FAULT (error code: {})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let faulting_address = Cr2::read();

    if from_user_mode(&stack_frame) {
        crate::error!(
            "PAGE FAULT in user mode: address {:?}, error {:?}",
            faulting_address,
            error_code
        );
        fault_current_process("PAGE FAULT", &stack_frame);
    }

    panic!(
        "EXCEPTION: PAGE FAULT\nAccessed Address: {:?}\nError Code: {:?}\n{:#?}",
        faulting_address, error_code, stack_frame
    );
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

// Hardware interrupt handlers

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    // EOI first: the tick may abandon this stack frame when it spawns a
    // root shell, and the next tick must still be deliverable.
    pic::end_of_interrupt(InterruptIndex::Timer.as_u8());
    crate::scheduler::timer_tick();
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    use x86_64::instructions::port::Port;

    let scancode = unsafe { Port::<u8>::new(0x60).read() };
    crate::drivers::keyboard::handle_scancode(scancode);
    pic::end_of_interrupt(InterruptIndex::Keyboard.as_u8());
}

extern "x86-interrupt" fn rtc_interrupt_handler(_stack_frame: InterruptStackFrame) {
    crate::drivers::rtc::handle_interrupt();
    pic::end_of_interrupt(InterruptIndex::Rtc.as_u8());
}
