//! Virtual terminals.
//!
//! Three independent console sessions share one display. Each terminal
//! owns a line-buffered input queue, a cursor, and an off-screen video
//! frame; Alt+F1..F3 decides which terminal's frame sits on the real
//! VGA page. Keyboard input always lands in the *displayed* terminal;
//! a process reading descriptor 0 blocks until its own terminal is
//! displayed and a complete line is available.
//!
//! Terminal output from the scheduled process goes straight to the live
//! frame when its terminal is displayed, and to the terminal's backing
//! frame otherwise, mirroring the aliasing the address-space manager
//! applies to user-mode video writes.

pub mod video;

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::interrupts;
use crate::process::manager;
use crate::vfs::{FileOps, OpenFile, VfsError};
use video::Frame;

/// Number of virtual terminals.
pub const TERMINAL_COUNT: usize = 3;

/// Input line buffer size; also the upper bound for command lines.
pub const LINE_BUFFER_SIZE: usize = 128;

/// Per-terminal state.
struct Terminal {
    input: [u8; LINE_BUFFER_SIZE],
    input_len: usize,
    cursor_x: usize,
    cursor_y: usize,
}

impl Terminal {
    const fn new() -> Self {
        Terminal {
            input: [0; LINE_BUFFER_SIZE],
            input_len: 0,
            cursor_x: 0,
            cursor_y: 0,
        }
    }

    /// Index just past the first completed line, if any.
    fn line_end(&self) -> Option<usize> {
        self.input[..self.input_len]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| i + 1)
    }

    /// Remove `n` consumed bytes from the front of the input queue.
    fn consume(&mut self, n: usize) {
        self.input.copy_within(n..self.input_len, 0);
        self.input_len -= n;
    }
}

const TERMINAL_INIT: Mutex<Terminal> = Mutex::new(Terminal::new());

static TERMINALS: [Mutex<Terminal>; TERMINAL_COUNT] = [TERMINAL_INIT; TERMINAL_COUNT];

/// Terminal currently on the display.
static DISPLAYED: AtomicUsize = AtomicUsize::new(0);

/// Clear all frames and bring up the cursor.
pub fn init() {
    Frame::display().clear();
    for t in 0..TERMINAL_COUNT {
        Frame::backing(t).clear();
    }
    video::enable_cursor();
    video::update_cursor(0, 0);
    crate::serial_println!("[TERM] {} virtual terminals ready", TERMINAL_COUNT);
}

/// Terminal currently shown on the physical display.
pub fn displayed() -> usize {
    DISPLAYED.load(Ordering::Acquire)
}

/// Put `terminal`'s frame on the display.
///
/// Swaps frame contents and the hardware cursor; the video alias for
/// the scheduled process is re-derived by the scheduler on its next
/// pass.
pub fn switch_display(terminal: usize) {
    if terminal >= TERMINAL_COUNT || terminal == displayed() {
        return;
    }

    interrupts::without_interrupts(|| {
        let old = displayed();
        Frame::display().copy_to(&Frame::backing(old));
        Frame::backing(terminal).copy_to(&Frame::display());
        DISPLAYED.store(terminal, Ordering::Release);

        let guard = TERMINALS[terminal].lock();
        video::update_cursor(guard.cursor_x, guard.cursor_y);
    });
}

/// Feed one decoded keyboard byte into the displayed terminal.
///
/// Runs in interrupt context. Printable bytes echo immediately;
/// backspace edits the pending line; newline completes it and unblocks
/// any reader.
pub fn keyboard_input(byte: u8) {
    let index = displayed();
    let mut term = TERMINALS[index].lock();
    let frame = Frame::display();

    match byte {
        0x08 => {
            // Never erase past a completed line.
            if term.input_len > 0 && term.input[term.input_len - 1] != b'\n' {
                term.input_len -= 1;
                if term.cursor_x > 0 {
                    term.cursor_x -= 1;
                    let (x, y) = (term.cursor_x, term.cursor_y);
                    frame.put(x, y, b' ');
                }
            }
        }
        b'\n' => {
            if term.input_len < LINE_BUFFER_SIZE {
                let at = term.input_len;
                term.input[at] = b'\n';
                term.input_len += 1;
                put_byte(&mut term, &frame, b'\n');
            }
        }
        0x20..=0x7E => {
            // Keep one slot free so the line can still be completed.
            if term.input_len < LINE_BUFFER_SIZE - 1 {
                let at = term.input_len;
                term.input[at] = byte;
                term.input_len += 1;
                put_byte(&mut term, &frame, byte);
            }
        }
        _ => {}
    }

    video::update_cursor(term.cursor_x, term.cursor_y);
}

/// Render one byte at a terminal's cursor and advance it.
fn put_byte(term: &mut Terminal, frame: &Frame, byte: u8) {
    if byte == b'\n' {
        term.cursor_x = 0;
        term.cursor_y += 1;
    } else {
        frame.put(term.cursor_x, term.cursor_y, byte);
        term.cursor_x += 1;
        if term.cursor_x == video::COLS {
            term.cursor_x = 0;
            term.cursor_y += 1;
        }
    }

    if term.cursor_y == video::ROWS {
        frame.scroll_up();
        term.cursor_y = video::ROWS - 1;
    }
}

/// Descriptor 0/1 backend: the terminal device.
pub struct TerminalDevice;

/// Global instance pre-bound to descriptors 0 and 1 at process
/// creation.
pub static TERMINAL_DEVICE: TerminalDevice = TerminalDevice;

impl FileOps for TerminalDevice {
    fn open(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        video::enable_cursor();
        Ok(())
    }

    fn close(&self, _file: &mut OpenFile) -> Result<(), VfsError> {
        Ok(())
    }

    /// Line-buffered read from the scheduled process's terminal.
    ///
    /// Blocks until that terminal owns the display and the user has
    /// completed a line; returns up to `buf.len()` bytes including the
    /// newline.
    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, VfsError> {
        if file.index != 0 {
            return Err(VfsError::BadDescriptor);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let terminal = manager::scheduled_terminal();
        loop {
            {
                let mut term = TERMINALS[terminal].lock();
                if displayed() == terminal {
                    if let Some(line_len) = term.line_end() {
                        let n = line_len.min(buf.len());
                        buf[..n].copy_from_slice(&term.input[..n]);
                        term.consume(n);
                        return Ok(n);
                    }
                }
            }
            interrupts::halt_until_interrupt();
        }
    }

    /// Write through to the terminal's frame, visible or not.
    fn write(&self, file: &mut OpenFile, buf: &[u8]) -> Result<usize, VfsError> {
        if file.index != 1 {
            return Err(VfsError::BadDescriptor);
        }

        let terminal = manager::scheduled_terminal();
        interrupts::without_interrupts(|| {
            let on_display = displayed() == terminal;
            let frame = Frame::for_terminal(terminal, on_display);
            let mut term = TERMINALS[terminal].lock();

            for &byte in buf {
                put_byte(&mut term, &frame, byte);
            }
            if on_display {
                video::update_cursor(term.cursor_x, term.cursor_y);
            }
        });

        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_bookkeeping() {
        let mut term = Terminal::new();
        assert!(term.line_end().is_none());

        for (i, &b) in b"ls\nrest".iter().enumerate() {
            term.input[i] = b;
        }
        term.input_len = 7;

        assert_eq!(term.line_end(), Some(3));
        term.consume(3);
        assert_eq!(term.input_len, 4);
        assert_eq!(&term.input[..4], b"rest");
        assert!(term.line_end().is_none());
    }

    #[test]
    fn test_partial_consume_keeps_newline() {
        let mut term = Terminal::new();
        for (i, &b) in b"abcd\n".iter().enumerate() {
            term.input[i] = b;
        }
        term.input_len = 5;

        // A reader with a 2-byte buffer drains the line in pieces.
        term.consume(2);
        assert_eq!(term.line_end(), Some(3));
        term.consume(3);
        assert_eq!(term.input_len, 0);
    }
}
