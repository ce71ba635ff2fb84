//! VGA text-mode frames.
//!
//! The display is the classic 80x25 text buffer at physical 0xB8000;
//! each terminal additionally owns a same-sized off-screen frame right
//! behind it. All access goes through the physical-memory offset
//! mapping, so frames can be written no matter which address space is
//! installed.

use x86_64::instructions::port::Port;

use crate::memory::{self, layout};

/// Text mode geometry.
pub const COLS: usize = 80;
pub const ROWS: usize = 25;

/// Attribute byte: light grey on black.
const ATTRIBUTE: u8 = 0x07;

/// Bytes per frame (two per cell).
pub const FRAME_BYTES: usize = COLS * ROWS * 2;

/// CRT controller ports for the hardware cursor.
const CRTC_INDEX: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;

/// A writable view over one text frame.
pub struct Frame {
    base: *mut u8,
}

impl Frame {
    /// The live display frame.
    pub fn display() -> Frame {
        Frame {
            base: memory::phys_to_virt(layout::VGA_TEXT_PHYS),
        }
    }

    /// The off-screen frame of `terminal`.
    pub fn backing(terminal: usize) -> Frame {
        Frame {
            base: memory::phys_to_virt(layout::terminal_backing_frame(terminal)),
        }
    }

    /// Frame a terminal's output should land in, given whether that
    /// terminal currently owns the display.
    pub fn for_terminal(terminal: usize, displayed: bool) -> Frame {
        if displayed {
            Frame::display()
        } else {
            Frame::backing(terminal)
        }
    }

    /// Write one character cell.
    pub fn put(&self, x: usize, y: usize, byte: u8) {
        let offset = (y * COLS + x) * 2;
        // SAFETY: offset is bounded by the 4KiB frame; the frame
        // addresses are fixed hardware/backing pages.
        unsafe {
            self.base.add(offset).write_volatile(byte);
            self.base.add(offset + 1).write_volatile(ATTRIBUTE);
        }
    }

    /// Blank the whole frame.
    pub fn clear(&self) {
        for y in 0..ROWS {
            for x in 0..COLS {
                self.put(x, y, b' ');
            }
        }
    }

    /// Move every line up one and blank the bottom row.
    pub fn scroll_up(&self) {
        // SAFETY: both halves of the copy stay inside the frame.
        unsafe {
            core::ptr::copy(
                self.base.add(COLS * 2),
                self.base,
                (ROWS - 1) * COLS * 2,
            );
        }
        for x in 0..COLS {
            self.put(x, ROWS - 1, b' ');
        }
    }

    /// Copy this frame's contents into `other`.
    pub fn copy_to(&self, other: &Frame) {
        // SAFETY: both frames are distinct 4KiB pages.
        unsafe {
            core::ptr::copy_nonoverlapping(self.base, other.base, FRAME_BYTES);
        }
    }
}

/// Move the hardware cursor.
pub fn update_cursor(x: usize, y: usize) {
    let pos = (y * COLS + x) as u16;
    unsafe {
        let mut index = Port::<u8>::new(CRTC_INDEX);
        let mut data = Port::<u8>::new(CRTC_DATA);
        index.write(0x0F);
        data.write((pos & 0xFF) as u8);
        index.write(0x0E);
        data.write((pos >> 8) as u8);
    }
}

/// Make the hardware cursor visible.
pub fn enable_cursor() {
    unsafe {
        let mut index = Port::<u8>::new(CRTC_INDEX);
        let mut data = Port::<u8>::new(CRTC_DATA);
        index.write(0x0A);
        data.write(14);
        index.write(0x0B);
        data.write(15);
    }
}
