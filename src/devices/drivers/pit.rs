//! # 8253/8254 Programmable Interval Timer
//!
//! Three counters fed by a 1.193182 MHz clock. The kernel uses two of them:
//!
//! | Channel | Data port | Owner           | Mode                |
//! |---------|-----------|-----------------|---------------------|
//! | 0       | 0x40      | `TimeSource`    | 2 (rate generator)  |
//! | 2       | 0x42      | `Speaker`       | 3 (square wave)     |
//!
//! Both share the command port (0x43), so every command byte names its
//! channel. Divisors are always written low byte first.

use core::fmt;

use crate::config::PIT_BASE_HZ;
use crate::core::io::PortIo;

pub const CHANNEL0_DATA: u16 = 0x40;
pub const CHANNEL2_DATA: u16 = 0x42;
pub const COMMAND: u16 = 0x43;

/// Access mode bits 4-5: low byte then high byte.
const ACCESS_LOBYTE_HIBYTE: u8 = 0b11 << 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitChannel {
    Channel0,
    Channel2,
}

impl PitChannel {
    const fn select_bits(self) -> u8 {
        match self {
            PitChannel::Channel0 => 0b00 << 6,
            PitChannel::Channel2 => 0b10 << 6,
        }
    }

    pub const fn data_port(self) -> u16 {
        match self {
            PitChannel::Channel0 => CHANNEL0_DATA,
            PitChannel::Channel2 => CHANNEL2_DATA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PitMode {
    RateGenerator = 2,
    SquareWave = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitError {
    /// No 16-bit divisor produces this frequency.
    FrequencyOutOfRange(u32),
}

impl fmt::Display for PitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitError::FrequencyOutOfRange(hz) => {
                write!(f, "{} Hz is outside the PIT range ({}..={} Hz)", hz, min_frequency(), PIT_BASE_HZ)
            }
        }
    }
}

pub const fn command_byte(channel: PitChannel, mode: PitMode) -> u8 {
    channel.select_bits() | ACCESS_LOBYTE_HIBYTE | (mode as u8) << 1
}

/// The counter reloads from 16 bits, where 0 stands for 65536.
pub const MAX_DIVISOR: u32 = 1 << 16;

/// Register value for `divisor`, or `None` outside `1..=MAX_DIVISOR`.
pub const fn encode_divisor(divisor: u32) -> Option<u16> {
    match divisor {
        0 => None,
        MAX_DIVISOR => Some(0),
        d if d < MAX_DIVISOR => Some(d as u16),
        _ => None,
    }
}

/// Lowest frequency whose divisor is at most `MAX_DIVISOR`.
pub const fn min_frequency() -> u32 {
    PIT_BASE_HZ / (MAX_DIVISOR + 1) + 1
}

/// Divisor register value for `hz`.
pub fn divisor_for(hz: u32) -> Result<u16, PitError> {
    if hz == 0 {
        return Err(PitError::FrequencyOutOfRange(hz));
    }
    encode_divisor(PIT_BASE_HZ / hz).ok_or(PitError::FrequencyOutOfRange(hz))
}

pub struct Pit<P: PortIo> {
    io: P,
}

impl<P: PortIo> Pit<P> {
    pub const fn new(io: P) -> Self {
        Self { io }
    }

    pub fn set_divisor(&mut self, channel: PitChannel, mode: PitMode, divisor: u16) {
        let [lo, hi] = divisor.to_le_bytes();
        self.io.write_u8(COMMAND, command_byte(channel, mode));
        self.io.write_u8(channel.data_port(), lo);
        self.io.write_u8(channel.data_port(), hi);
    }

    /// Programs `channel` for `hz` and returns the divisor used. Nothing is
    /// written when the frequency is out of range.
    pub fn set_frequency(&mut self, channel: PitChannel, mode: PitMode, hz: u32) -> Result<u16, PitError> {
        let divisor = divisor_for(hz)?;
        self.set_divisor(channel, mode, divisor);
        Ok(divisor)
    }

    pub fn io(&mut self) -> &mut P {
        &mut self.io
    }
}
