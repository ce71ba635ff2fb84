//! Hardware device drivers: PIT, RTC and the PS/2 keyboard.

pub mod keyboard;
pub mod pit;
pub mod rtc;
