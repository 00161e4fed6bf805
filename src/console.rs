//! Text output for the kernel core.
//!
//! Everything the core prints goes through one replaceable [`ConsoleSink`]:
//! keyboard echo, log records, the memory report and fatal messages. A VGA
//! text driver or a shell can install its own sink with [`set_sink`]. Until
//! then the bare-metal build writes to COM1 and hosted builds discard.

use core::fmt::{self, Write};

use spin::Mutex;

#[derive(Clone, Copy)]
pub struct ConsoleSink {
    pub write_char: fn(char),
    pub write_str: fn(&str),
}

impl ConsoleSink {
    pub const fn discard() -> Self {
        fn drop_char(_: char) {}
        fn drop_str(_: &str) {}
        Self {
            write_char: drop_char,
            write_str: drop_str,
        }
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

#[cfg(target_os = "none")]
const DEFAULT_SINK: ConsoleSink = ConsoleSink {
    write_char: serial::write_char,
    write_str: serial::write_str,
};

#[cfg(not(target_os = "none"))]
const DEFAULT_SINK: ConsoleSink = ConsoleSink::discard();

static SINK: Mutex<ConsoleSink> = Mutex::new(DEFAULT_SINK);

/// Brings up the default output device.
pub fn init() {
    #[cfg(target_os = "none")]
    serial::init();
}

// SINK is also taken from interrupt handlers, so it is never held with
// interrupts enabled.

/// Installs `sink` and returns the one it replaced.
pub fn set_sink(sink: ConsoleSink) -> ConsoleSink {
    crate::core::cpu::without_interrupts(|| core::mem::replace(&mut *SINK.lock(), sink))
}

fn sink() -> ConsoleSink {
    crate::core::cpu::without_interrupts(|| *SINK.lock())
}

pub fn write_str(s: &str) {
    (sink().write_str)(s);
}

pub fn write_char(c: char) {
    (sink().write_char)(c);
}

struct Console;

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_str(s);
        Ok(())
    }
}

pub fn write_fmt(args: fmt::Arguments<'_>) {
    let _ = Console.write_fmt(args);
}

/// Used by the fatal path: the interrupted code may hold the console locks.
/// Hosted builds have no interrupted code, only other threads, so the locks
/// are left alone there.
pub fn emergency_write(args: fmt::Arguments<'_>) {
    #[cfg(target_os = "none")]
    {
        force_release(&SINK);
        serial::force_unlock();
    }
    write_fmt(args);
}

#[cfg(any(target_os = "none", test))]
fn force_release<T>(lock: &Mutex<T>) {
    if lock.is_locked() {
        unsafe { lock.force_unlock() };
    }
}

#[cfg(target_os = "none")]
mod serial {
    use core::fmt::Write;

    use spin::Mutex;
    use uart_16550::SerialPort;

    use crate::config::SERIAL_PORT_BASE;

    static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(SERIAL_PORT_BASE) });

    pub fn init() {
        SERIAL.lock().init();
    }

    pub fn force_unlock() {
        super::force_release(&SERIAL);
    }

    pub fn write_char(c: char) {
        let mut buf = [0u8; 4];
        write_str(c.encode_utf8(&mut buf));
    }

    pub fn write_str(s: &str) {
        crate::core::cpu::without_interrupts(|| {
            let _ = SERIAL.lock().write_str(s);
        });
    }
}

#[cfg(target_os = "none")]
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::write_fmt(format_args!($($arg)*)));
}

#[cfg(target_os = "none")]
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::string::String;
    use std::sync::Mutex as StdMutex;

    std::thread_local! {
        static CAPTURED: RefCell<String> = const { RefCell::new(String::new()) };
    }

    /// Serialises tests that swap the global sink.
    static SINK_GUARD: StdMutex<()> = StdMutex::new(());

    fn capture_char(c: char) {
        CAPTURED.with(|out| out.borrow_mut().push(c));
    }

    fn capture_str(s: &str) {
        CAPTURED.with(|out| out.borrow_mut().push_str(s));
    }

    const CAPTURE: ConsoleSink = ConsoleSink {
        write_char: capture_char,
        write_str: capture_str,
    };

    /// Runs `f` with console output captured and returns what this thread
    /// printed.
    pub(crate) fn captured<F: FnOnce()>(f: F) -> String {
        let _guard = SINK_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        CAPTURED.with(|out| out.borrow_mut().clear());
        let previous = set_sink(CAPTURE);
        f();
        set_sink(previous);
        CAPTURED.with(|out| core::mem::take(&mut *out.borrow_mut()))
    }

    #[test]
    fn output_reaches_the_installed_sink() {
        let out = captured(|| {
            write_str("abc");
            write_char('é');
            write_fmt(format_args!(" {}-{:02}", 7, 3));
        });
        assert_eq!(out, "abcé 7-03");
    }

    #[test]
    fn force_release_frees_an_abandoned_lock() {
        let sink = Mutex::new(CAPTURE);
        core::mem::forget(sink.lock());
        assert!(sink.try_lock().is_none());

        force_release(&sink);
        let out = {
            CAPTURED.with(|out| out.borrow_mut().clear());
            (sink.lock().write_str)("still here");
            CAPTURED.with(|out| core::mem::take(&mut *out.borrow_mut()))
        };
        assert_eq!(out, "still here");

        // Releasing a free lock is harmless.
        force_release(&sink);
        assert!(sink.try_lock().is_some());
    }

    #[test]
    fn emergency_write_reaches_the_installed_sink() {
        let out = captured(|| emergency_write(format_args!("KERNEL PANIC: {}\n", "boom")));
        assert_eq!(out, "KERNEL PANIC: boom\n");
    }

    #[test]
    fn set_sink_returns_the_previous_sink() {
        let out = captured(|| {
            let previous = set_sink(ConsoleSink::discard());
            write_str("dropped");
            set_sink(previous);
            write_str("kept");
        });
        assert_eq!(out, "kept");
    }
}
