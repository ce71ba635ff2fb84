//! Serial port driver for console output.
//!
//! All kernel diagnostics go out over the 16550 UART on COM1; the VGA
//! text frames belong to the virtual terminals and are never used for
//! kernel logging.

use core::fmt;
use core::fmt::Write;
use spin::Mutex;
use uart_16550::SerialPort;

/// COM1 base address.
const COM1_BASE: u16 = 0x3F8;

/// Global serial port (COM1).
static SERIAL1: Mutex<Option<SerialPort>> = Mutex::new(None);

/// Initialize the serial port.
pub fn init() {
    let mut port = unsafe { SerialPort::new(COM1_BASE) };
    port.init();
    *SERIAL1.lock() = Some(port);
}

/// Write a byte to COM1.
pub fn write_byte(byte: u8) {
    if let Some(ref mut serial) = *SERIAL1.lock() {
        serial.send(byte);
    }
}

/// Write a string to COM1.
pub fn write_str(s: &str) {
    for byte in s.bytes() {
        write_byte(byte);
    }
}

/// Serial writer for formatting.
pub struct SerialWriter;

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_str(s);
        Ok(())
    }
}

/// Print macro for serial output.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*));
    };
}

/// Println macro for serial output.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => {
        $crate::serial_print!("{}\n", format_args!($($arg)*));
    };
}

/// Internal print function.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use x86_64::instructions::interrupts;

    // Output before init (or in hosted tests) is dropped.
    if SERIAL1.lock().is_none() {
        return;
    }

    // Interrupt handlers log too; keep them out while the port is held.
    interrupts::without_interrupts(|| {
        let _ = SerialWriter.write_fmt(args);
    });
}

/// Log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace = 0,
    /// Debug level.
    Debug = 1,
    /// Info level.
    Info = 2,
    /// Warning level.
    Warn = 3,
    /// Error level.
    Error = 4,
}

/// Current log level.
static LOG_LEVEL: Mutex<LogLevel> = Mutex::new(LogLevel::Info);

/// Set the log level.
pub fn set_log_level(level: LogLevel) {
    *LOG_LEVEL.lock() = level;
}

/// Get the current log level.
pub fn log_level() -> LogLevel {
    *LOG_LEVEL.lock()
}

/// Log a message at the given level.
pub fn log(level: LogLevel, args: fmt::Arguments) {
    if level >= log_level() {
        let prefix = match level {
            LogLevel::Trace => "[TRACE]",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Info => "[INFO ]",
            LogLevel::Warn => "[WARN ]",
            LogLevel::Error => "[ERROR]",
        };
        serial_println!("{} {}", prefix, args);
    }
}

/// Log macros.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::serial::log($crate::serial::LogLevel::Trace, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::serial::log($crate::serial::LogLevel::Debug, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::serial::log($crate::serial::LogLevel::Info, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::serial::log($crate::serial::LogLevel::Warn, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::serial::log($crate::serial::LogLevel::Error, format_args!($($arg)*));
    };
}
