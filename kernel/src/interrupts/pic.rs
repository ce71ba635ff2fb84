//! Programmable Interrupt Controller (8259 PIC) driver.
//!
//! Owns interrupt masking for the legacy PIC pair. IRQs are remapped
//! above the CPU exception range and start out fully masked; subsystems
//! unmask their own line when they register a handler.

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

/// PIC1 offset (IRQ 0-7 mapped to interrupts 32-39).
pub const PIC1_OFFSET: u8 = 32;

/// PIC2 offset (IRQ 8-15 mapped to interrupts 40-47).
pub const PIC2_OFFSET: u8 = 40;

/// IRQ line the slave PIC cascades through.
const CASCADE_IRQ: u8 = 2;

/// The chained PICs (master and slave).
static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(PIC1_OFFSET, PIC2_OFFSET) });

/// Initialize the PICs with every line masked.
pub fn init() {
    unsafe {
        PICS.lock().initialize();
        // Mask everything; drivers unmask their own line.
        Port::<u8>::new(0x21).write(0xFF);
        Port::<u8>::new(0xA1).write(0xFF);
    }
    crate::serial_println!("[PIC ] 8259 pair remapped to {}..{}", PIC1_OFFSET, PIC2_OFFSET + 8);
}

/// Send end-of-interrupt for the given interrupt vector.
pub fn end_of_interrupt(interrupt_id: u8) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(interrupt_id);
    }
}

/// Unmask a specific IRQ line.
///
/// Unmasking a slave line also unmasks the cascade line on the master.
pub fn enable_irq(irq: u8) {
    if irq < 8 {
        let mut port = Port::<u8>::new(0x21);
        let mask = unsafe { port.read() } & !(1 << irq);
        unsafe { port.write(mask) };
    } else {
        let mut slave = Port::<u8>::new(0xA1);
        let mask = unsafe { slave.read() } & !(1 << (irq - 8));
        unsafe { slave.write(mask) };
        enable_irq(CASCADE_IRQ);
    }
}

/// Mask a specific IRQ line.
pub fn disable_irq(irq: u8) {
    if irq < 8 {
        let mut port = Port::<u8>::new(0x21);
        let mask = unsafe { port.read() } | (1 << irq);
        unsafe { port.write(mask) };
    } else {
        let mut slave = Port::<u8>::new(0xA1);
        let mask = unsafe { slave.read() } | (1 << (irq - 8));
        unsafe { slave.write(mask) };
    }
}
