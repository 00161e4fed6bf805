//! Last stop for unrecoverable errors.
//!
//! Interrupts are masked first so nothing else runs. The console lock is
//! broken in case the failing code held it, the message is written as
//! `KERNEL PANIC: <msg>`, and the CPU halts for good. Hosted builds end in
//! a Rust panic instead so tests can watch it happen.

use core::fmt;

use crate::console;
use crate::core::cpu;

pub fn halt_with(msg: &str) -> ! {
    halt_fmt(format_args!("{}", msg))
}

pub fn halt_fmt(args: fmt::Arguments<'_>) -> ! {
    cpu::disable_interrupts();
    console::emergency_write(format_args!("KERNEL PANIC: {}\n", args));
    stop(args)
}

#[cfg(target_os = "none")]
fn stop(_args: fmt::Arguments<'_>) -> ! {
    cpu::halt_forever()
}

#[cfg(not(target_os = "none"))]
fn stop(args: fmt::Arguments<'_>) -> ! {
    panic!("KERNEL PANIC: {}", args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::captured;

    #[test]
    #[should_panic(expected = "KERNEL PANIC: heap exhausted")]
    fn halt_with_panics_on_the_host() {
        halt_with("heap exhausted");
    }

    #[test]
    fn message_is_written_before_stopping() {
        let out = captured(|| {
            let result = std::panic::catch_unwind(|| {
                halt_fmt(format_args!("bad free at {:#x}", 0x1234));
            });
            assert!(result.is_err());
        });
        assert_eq!(out, "KERNEL PANIC: bad free at 0x1234\n");
    }
}
