//! # Input Event Types
//!
//! Defines the key events produced by the keyboard pipeline and the ring
//! that carries them from IRQ1 to ordinary kernel code.
//!
//! ## Event Types
//!
//! - `KeyEvent::Char(c)`: a translated printable character
//! - `KeyEvent::Enter`, `Backspace`, `Tab`, `Escape`
//! - `KeyEvent::Arrow(Direction)`
//!
//! ## Ring
//!
//! `KeyEventRing` is single-producer (IRQ1), single-consumer (kernel code).
//! Events travel as one `u32` code per slot so every slot access is a single
//! aligned load or store. Head and tail only ever count up; `head - tail` is
//! the number of unread events.
//!
//! When the ring is full the producer overwrites the oldest slot and does
//! not touch `tail`. The consumer notices that `head - tail` exceeds the
//! capacity and skips ahead. After reading a slot it checks `head` again, so
//! an overwrite that raced the read (IRQ1 firing mid-`pop`) is retried.
//! That check is sound because producer and consumer share one CPU.

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Char(char),
    Enter,
    Backspace,
    Tab,
    Escape,
    Arrow(Direction),
}

/// Codes above the Unicode range are synthetic keys.
const MARKER_BASE: u32 = 0x11_0000;
const MARKER_ENTER: u32 = MARKER_BASE;
const MARKER_BACKSPACE: u32 = MARKER_BASE + 1;
const MARKER_TAB: u32 = MARKER_BASE + 2;
const MARKER_ESCAPE: u32 = MARKER_BASE + 3;
const MARKER_UP: u32 = MARKER_BASE + 4;
const MARKER_DOWN: u32 = MARKER_BASE + 5;
const MARKER_LEFT: u32 = MARKER_BASE + 6;
const MARKER_RIGHT: u32 = MARKER_BASE + 7;

impl KeyEvent {
    pub const fn code(self) -> u32 {
        match self {
            KeyEvent::Char(c) => c as u32,
            KeyEvent::Enter => MARKER_ENTER,
            KeyEvent::Backspace => MARKER_BACKSPACE,
            KeyEvent::Tab => MARKER_TAB,
            KeyEvent::Escape => MARKER_ESCAPE,
            KeyEvent::Arrow(Direction::Up) => MARKER_UP,
            KeyEvent::Arrow(Direction::Down) => MARKER_DOWN,
            KeyEvent::Arrow(Direction::Left) => MARKER_LEFT,
            KeyEvent::Arrow(Direction::Right) => MARKER_RIGHT,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let event = match code {
            MARKER_ENTER => KeyEvent::Enter,
            MARKER_BACKSPACE => KeyEvent::Backspace,
            MARKER_TAB => KeyEvent::Tab,
            MARKER_ESCAPE => KeyEvent::Escape,
            MARKER_UP => KeyEvent::Arrow(Direction::Up),
            MARKER_DOWN => KeyEvent::Arrow(Direction::Down),
            MARKER_LEFT => KeyEvent::Arrow(Direction::Left),
            MARKER_RIGHT => KeyEvent::Arrow(Direction::Right),
            _ => KeyEvent::Char(char::from_u32(code)?),
        };
        Some(event)
    }

    pub fn as_char(self) -> Option<char> {
        match self {
            KeyEvent::Char(c) => Some(c),
            KeyEvent::Enter => Some('\n'),
            KeyEvent::Tab => Some('\t'),
            _ => None,
        }
    }
}

pub struct KeyEventRing<const N: usize> {
    slots: [AtomicU32; N],
    head: AtomicU32,
    tail: AtomicU32,
    evicted: AtomicU32,
}

impl<const N: usize> KeyEventRing<N> {
    const CAPACITY_IS_VALID: () = assert!(N.is_power_of_two() && N <= 1 << 16);
    const CAPACITY: u32 = N as u32;

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_IS_VALID;
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: AtomicU32 = AtomicU32::new(0);
        Self {
            slots: [EMPTY; N],
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            evicted: AtomicU32::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Producer side. Returns false when an unread event was overwritten.
    pub fn push(&self, event: KeyEvent) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let overwrote = head.wrapping_sub(self.tail.load(Ordering::Acquire)) >= Self::CAPACITY;
        self.slots[head as usize % N].store(event.code(), Ordering::Relaxed);
        self.head.store(head.wrapping_add(1), Ordering::Release);
        !overwrote
    }

    /// Consumer side.
    pub fn pop(&self) -> Option<KeyEvent> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Relaxed);
            if head == tail {
                return None;
            }

            let oldest = if head.wrapping_sub(tail) > Self::CAPACITY {
                head.wrapping_sub(Self::CAPACITY)
            } else {
                tail
            };
            let code = self.slots[oldest as usize % N].load(Ordering::Relaxed);

            // Overwritten while we were reading it.
            if self.head.load(Ordering::Acquire).wrapping_sub(oldest) > Self::CAPACITY {
                continue;
            }

            if oldest != tail {
                self.evicted
                    .fetch_add(oldest.wrapping_sub(tail), Ordering::Relaxed);
            }
            self.tail.store(oldest.wrapping_add(1), Ordering::Release);

            if let Some(event) = KeyEvent::from_code(code) {
                return Some(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        let pending = self
            .head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire));
        pending.min(Self::CAPACITY) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Events pushed since boot (wraps at 2^32).
    pub fn produced(&self) -> u32 {
        self.head.load(Ordering::Acquire)
    }

    /// Events lost to overflow, including ones the consumer has not skipped yet.
    pub fn evicted(&self) -> u32 {
        let overrun = self
            .head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire))
            .saturating_sub(Self::CAPACITY);
        self.evicted.load(Ordering::Relaxed) + overrun
    }
}

impl<const N: usize> Default for KeyEventRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
