//! CMOS real-time clock driver.
//!
//! The RTC is an ordinary pollable device behind the standard
//! four-operation contract: `open` resets the interrupt rate to 2Hz,
//! `write` accepts a 4-byte power-of-two frequency, and `read` blocks
//! until the next RTC interrupt fires. Blocking means halting the CPU
//! and re-checking; the calling process makes no progress, but only the
//! scheduler's timer tick ever moves execution to another process.

use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

use crate::vfs::{FileOps, OpenFile, VfsError};

/// Index/data ports of the CMOS.
const RTC_PORT: u16 = 0x70;
const CMOS_PORT: u16 = 0x71;

/// Status registers (with NMI disabled while selected).
const REG_A: u8 = 0x8A;
const REG_B: u8 = 0x8B;
const REG_C: u8 = 0x0C;

/// Periodic interrupt enable bit in register B.
const REG_B_PERIODIC: u8 = 0x40;

/// Lowest and highest frequencies `write` accepts.
const MIN_FREQ: u32 = 2;
const MAX_FREQ: u32 = 1024;

/// Set by the interrupt handler, consumed by blocked readers.
static INTERRUPT_OCCURRED: AtomicBool = AtomicBool::new(false);

/// Enable the periodic interrupt and unmask IRQ8.
pub fn init() {
    interrupts::without_interrupts(|| unsafe {
        let mut index = Port::<u8>::new(RTC_PORT);
        let mut data = Port::<u8>::new(CMOS_PORT);

        index.write(REG_B);
        let prev = data.read();
        index.write(REG_B);
        data.write(prev | REG_B_PERIODIC);

        crate::interrupts::pic::enable_irq(8);
    });

    set_frequency(MIN_FREQ).expect("default RTC rate");
    crate::serial_println!("[RTC ] Periodic interrupt enabled at {} Hz", MIN_FREQ);
}

/// Change the periodic interrupt rate.
///
/// Only powers of two between 2 and 1024 Hz map onto the divider; the
/// hardware rate for frequency f is `16 - log2(f)`.
pub fn set_frequency(hz: u32) -> Result<(), VfsError> {
    if !(MIN_FREQ..=MAX_FREQ).contains(&hz) || !hz.is_power_of_two() {
        return Err(VfsError::InvalidArgument);
    }
    let rate = (16 - hz.trailing_zeros()) as u8;

    interrupts::without_interrupts(|| unsafe {
        let mut index = Port::<u8>::new(RTC_PORT);
        let mut data = Port::<u8>::new(CMOS_PORT);

        index.write(REG_A);
        let prev = data.read();
        index.write(REG_A);
        data.write((prev & 0xF0) | rate);
    });

    Ok(())
}

/// IRQ8 handler body: latch the completion flag and drain register C.
///
/// Register C must be read or the RTC never raises the line again.
pub fn handle_interrupt() {
    INTERRUPT_OCCURRED.store(true, Ordering::Release);

    unsafe {
        Port::<u8>::new(RTC_PORT).write(REG_C);
        let _ = Port::<u8>::new(CMOS_PORT).read();
    }
}

/// The RTC's operation table.
pub struct RtcDevice;

/// Global instance bound into descriptors by `open`.
pub static RTC_DEVICE: RtcDevice = RtcDevice;

impl FileOps for RtcDevice {
    fn open(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        set_frequency(MIN_FREQ)
    }

    fn close(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        Ok(())
    }

    /// Block until the next RTC interrupt, then report zero bytes.
    fn read(&self, _file: &mut OpenFile, _buf: &mut [u8]) -> Result<usize, VfsError> {
        while !INTERRUPT_OCCURRED.load(Ordering::Acquire) {
            crate::interrupts::halt_until_interrupt();
        }
        INTERRUPT_OCCURRED.store(false, Ordering::Release);
        Ok(0)
    }

    /// Accept a 4-byte little-endian frequency.
    fn write(&self, _file: &mut OpenFile, buf: &[u8]) -> Result<usize, VfsError> {
        if buf.len() != 4 {
            return Err(VfsError::InvalidArgument);
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(buf);
        set_frequency(u32::from_le_bytes(bytes))?;
        Ok(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_validation() {
        // Hardware-facing set_frequency cannot run hosted, but the
        // validation rule is the contract: powers of two in 2..=1024.
        for hz in [2u32, 4, 8, 16, 32, 64, 128, 256, 512, 1024] {
            assert!(hz.is_power_of_two() && (MIN_FREQ..=MAX_FREQ).contains(&hz));
        }
        for hz in [0u32, 1, 3, 6, 100, 2048] {
            assert!(!hz.is_power_of_two() || !(MIN_FREQ..=MAX_FREQ).contains(&hz));
        }
    }

    #[test]
    fn test_rate_mapping() {
        // 2 Hz -> rate 15, 1024 Hz -> rate 6.
        assert_eq!(16 - 2u32.trailing_zeros(), 15);
        assert_eq!(16 - 1024u32.trailing_zeros(), 6);
    }
}
