//! PS/2 keyboard driver.
//!
//! Scancodes arrive on IRQ1 and are decoded with `pc-keyboard`
//! (scancode set 1, US layout). Decoded characters feed the displayed
//! terminal's line buffer; Alt+F1..F3 switches which terminal owns the
//! display. Alt and the function keys are tracked from the raw
//! scancodes so the chord works regardless of decoder state.

use core::sync::atomic::{AtomicBool, Ordering};

use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;

/// Raw scancodes involved in terminal switching.
const SC_ALT_DOWN: u8 = 0x38;
const SC_ALT_UP: u8 = 0xB8;
const SC_F1: u8 = 0x3B;
const SC_F3: u8 = 0x3D;

/// Left or right Alt currently held. Right Alt arrives as an 0xE0
/// extension of the same code, so one flag covers both.
static ALT_HELD: AtomicBool = AtomicBool::new(false);

static KEYBOARD: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(Keyboard::new(
    ScancodeSet1::new(),
    layouts::Us104Key,
    HandleControl::Ignore,
));

/// IRQ1 handler body.
pub fn handle_scancode(scancode: u8) {
    match scancode {
        SC_ALT_DOWN => ALT_HELD.store(true, Ordering::Relaxed),
        SC_ALT_UP => ALT_HELD.store(false, Ordering::Relaxed),
        _ => {}
    }

    // Alt+F1..F3: display switch, consumed before decoding.
    if ALT_HELD.load(Ordering::Relaxed) && (SC_F1..=SC_F3).contains(&scancode) {
        crate::terminal::switch_display((scancode - SC_F1) as usize);
        return;
    }

    let mut keyboard = KEYBOARD.lock();
    if let Ok(Some(event)) = keyboard.add_byte(scancode) {
        if let Some(DecodedKey::Unicode(c)) = keyboard.process_keyevent(event) {
            let byte = match c {
                '\r' | '\n' => b'\n',
                c if c.is_ascii() => c as u8,
                _ => return,
            };
            crate::terminal::keyboard_input(byte);
        }
    }
}
