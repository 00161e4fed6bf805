//! # Port I/O
//!
//! Typed access to the x86 I/O port space.
//!
//! Drivers in this crate are generic over [`PortIo`] so the same code runs
//! against [`Pio`] on hardware and against a recording bus in tests.
//!
//! ## Ports touched by the kernel core
//!
//! | Port        | Device                          |
//! |-------------|---------------------------------|
//! | 0x20 / 0x21 | master PIC command / data       |
//! | 0xA0 / 0xA1 | slave PIC command / data        |
//! | 0x40 - 0x43 | PIT channels and command        |
//! | 0x60 / 0x64 | PS/2 data / status              |
//! | 0x61        | PC speaker gate                 |
//! | 0x80        | POST port, used as an I/O delay |

/// Port used for [`PortIo::io_wait`].
pub const IO_WAIT_PORT: u16 = 0x80;

pub trait PortIo {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);
    fn read_u16(&mut self, port: u16) -> u16;
    fn write_u16(&mut self, port: u16, value: u16);

    /// Gives slow devices (the 8259 in particular) time to settle between
    /// consecutive writes.
    fn io_wait(&mut self) {
        self.write_u8(IO_WAIT_PORT, 0);
    }
}

/// The real port space, accessed with `in`/`out`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pio;

impl Pio {
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl PortIo for Pio {
    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    #[inline]
    fn write_u8(&mut self, port: u16, value: u8) {
        unsafe {
            core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    fn read_u16(&mut self, port: u16) -> u16 {
        let value: u16;
        unsafe {
            core::arch::asm!("in ax, dx", out("ax") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    #[inline]
    fn write_u16(&mut self, port: u16, value: u16) {
        unsafe {
            core::arch::asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags));
        }
    }
}

/// No port space on other architectures: reads float high, writes vanish.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
impl PortIo for Pio {
    fn read_u8(&mut self, _port: u16) -> u8 {
        0xFF
    }

    fn write_u8(&mut self, _port: u16, _value: u8) {}

    fn read_u16(&mut self, _port: u16) -> u16 {
        0xFFFF
    }

    fn write_u16(&mut self, _port: u16, _value: u16) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Access, MockPorts};

    #[test]
    fn io_wait_writes_the_post_port() {
        let mut ports = MockPorts::new();
        ports.io_wait();
        assert_eq!(ports.log(), vec![Access::Write8(IO_WAIT_PORT, 0)]);
    }

    #[test]
    fn word_reads_are_little_endian() {
        let mut ports = MockPorts::new();
        ports.script(0x1F0, &[0x34, 0x12]);
        assert_eq!(ports.read_u16(0x1F0), 0x1234);
    }
}
