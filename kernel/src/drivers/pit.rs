//! Programmable Interval Timer (8253/8254) driver.
//!
//! Channel 0 drives IRQ0 at the scheduling quantum. This is the sole
//! source of preemption in the system; everything else that "waits"
//! does so by halting until this (or another) interrupt arrives.

use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

/// Base oscillator frequency of the PIT.
const PIT_BASE_HZ: u32 = 1_193_182;

/// Channel 0 data port.
const PIT_CH0_PORT: u16 = 0x40;

/// Mode/command port.
const PIT_CMD_PORT: u16 = 0x43;

/// Command: channel 0, lobyte/hibyte access, mode 3 (square wave).
const PIT_CMD_SQUARE_WAVE: u8 = 0x36;

/// Default scheduling quantum.
pub const DEFAULT_HZ: u32 = 50;

/// Program channel 0 to fire at `hz` and unmask IRQ0.
///
/// The quantum is fixed for the life of the system; it is configurable
/// only here, at initialization.
pub fn init(hz: u32) {
    let divisor = (PIT_BASE_HZ / hz.max(19)) as u16;

    interrupts::without_interrupts(|| unsafe {
        Port::<u8>::new(PIT_CMD_PORT).write(PIT_CMD_SQUARE_WAVE);
        Port::<u8>::new(PIT_CH0_PORT).write((divisor & 0xFF) as u8);
        Port::<u8>::new(PIT_CH0_PORT).write((divisor >> 8) as u8);
        crate::interrupts::pic::enable_irq(0);
    });

    crate::serial_println!("[PIT ] Quantum timer at {} Hz (divisor {})", hz, divisor);
}
