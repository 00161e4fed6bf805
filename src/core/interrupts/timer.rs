//! # System Timer
//!
//! PIT channel 0 fires IRQ0 at `TIMER_HZ`; each interrupt advances a 64-bit
//! tick counter. Everything that waits in the kernel waits on this counter.
//!
//! ## Sleeping
//!
//! | Function      | Waits with        | Use when                         |
//! |---------------|-------------------|----------------------------------|
//! | `sleep_halt`  | `sti; hlt`        | normal kernel code               |
//! | `sleep_busy`  | `spin_loop`       | halting is not allowed           |
//!
//! Both return once `ceil(ms * hz / 1000)` ticks have elapsed, so the
//! requested time is a lower bound. The counter is compared with wrapping
//! subtraction.
//!
//! ## Reading a 64-bit tick on a 32-bit CPU
//!
//! The counter is two 32-bit halves behind a sequence number. IRQ0 is the
//! only writer: it makes the sequence odd, updates the halves and makes it
//! even again. Readers retry until they see the same even sequence before
//! and after reading both halves.

use core::hint::spin_loop;
use core::sync::atomic::{fence, AtomicU32, Ordering};

use super::frame::RegisterFrame;
use super::interrupts::{self, InterruptHandler};
use super::pic::InterruptIndex;
use crate::core::cpu;
use crate::core::io::{Pio, PortIo};
use crate::devices::drivers::pit::{Pit, PitChannel, PitError, PitMode};
use crate::devices::drivers::speaker::Sleep;

pub struct TickCounter {
    sequence: AtomicU32,
    low: AtomicU32,
    high: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            sequence: AtomicU32::new(0),
            low: AtomicU32::new(0),
            high: AtomicU32::new(0),
        }
    }

    /// Single writer only.
    pub fn store(&self, value: u64) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.low.store(value as u32, Ordering::Relaxed);
        self.high.store((value >> 32) as u32, Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Single writer only.
    pub fn increment(&self) {
        self.store(self.load().wrapping_add(1));
    }

    pub fn load(&self) -> u64 {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 != 0 {
                spin_loop();
                continue;
            }
            let low = self.low.load(Ordering::Relaxed);
            let high = self.high.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return (high as u64) << 32 | low as u64;
            }
        }
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TimeSource {
    ticks: TickCounter,
    hz: AtomicU32,
}

impl TimeSource {
    /// Not programmed yet: frequency 0, every sleep returns at once.
    pub const fn new() -> Self {
        Self {
            ticks: TickCounter::new(),
            hz: AtomicU32::new(0),
        }
    }

    pub const fn with_frequency(hz: u32) -> Self {
        Self {
            ticks: TickCounter::new(),
            hz: AtomicU32::new(hz),
        }
    }

    /// Programs PIT channel 0 as a rate generator at `hz` and returns the
    /// divisor written.
    pub fn program<P: PortIo>(&self, io: P, hz: u32) -> Result<u16, PitError> {
        let divisor = Pit::new(io).set_frequency(PitChannel::Channel0, PitMode::RateGenerator, hz)?;
        self.hz.store(hz, Ordering::Relaxed);
        Ok(divisor)
    }

    pub fn frequency(&self) -> u32 {
        self.hz.load(Ordering::Relaxed)
    }

    /// IRQ0 body.
    #[inline]
    pub fn tick(&self) {
        self.ticks.increment();
    }

    pub fn now_ticks(&self) -> u64 {
        self.ticks.load()
    }

    pub fn ticks_for_ms(&self, ms: u32) -> u64 {
        (ms as u64 * self.frequency() as u64).div_ceil(1000)
    }

    pub fn uptime_ms(&self) -> u64 {
        match self.frequency() {
            0 => 0,
            hz => self.now_ticks() * 1000 / hz as u64,
        }
    }

    /// Calls `wait` until `ms` worth of ticks have passed.
    pub fn sleep_with<W: FnMut()>(&self, ms: u32, mut wait: W) {
        let start = self.now_ticks();
        let needed = self.ticks_for_ms(ms);
        while self.now_ticks().wrapping_sub(start) < needed {
            wait();
        }
    }

    pub fn sleep_busy(&self, ms: u32) {
        self.sleep_with(ms, spin_loop);
    }

    /// Leaves interrupts enabled on return.
    pub fn sleep_halt(&self, ms: u32) {
        self.sleep_with(ms, cpu::enable_and_halt);
    }

    #[cfg(test)]
    pub(crate) fn set_ticks(&self, value: u64) {
        self.ticks.store(value);
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Sleep for TimeSource {
    fn sleep_ms(&self, ms: u32) {
        self.sleep_halt(ms);
    }
}

pub static TIMER: TimeSource = TimeSource::new();

fn timer_interrupt(_frame: &mut RegisterFrame, context: usize) {
    let source = unsafe { &*(context as *const TimeSource) };
    source.tick();
}

/// Starts the system tick. Interrupts must still be disabled.
pub fn init(hz: u32) -> Result<(), PitError> {
    let divisor = cpu::without_interrupts(|| TIMER.program(Pio::new(), hz))?;
    interrupts::register_irq(
        InterruptIndex::Timer.line(),
        InterruptHandler::new(timer_interrupt, &TIMER as *const TimeSource as usize),
    );
    interrupts::unmask_irq(InterruptIndex::Timer.line());
    log::info!("Timer: PIT channel 0 at {} Hz (divisor {})", hz, divisor);
    Ok(())
}

pub fn now_ticks() -> u64 {
    TIMER.now_ticks()
}

pub fn uptime_ms() -> u64 {
    TIMER.uptime_ms()
}

pub fn sleep_busy(ms: u32) {
    TIMER.sleep_busy(ms);
}

pub fn sleep_halt(ms: u32) {
    TIMER.sleep_halt(ms);
}
