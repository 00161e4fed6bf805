//! Device Drivers
//!
//! This module contains drivers for various hardware devices:
//! - PIT 8253/8254 (channel 0 tick, channel 2 tone)
//! - PS/2 Keyboard (IRQ1) and its US keymap
//! - PC Speaker (port 0x61)

pub mod keymap;
pub mod pit;
pub mod ps2_keyboard;
pub mod speaker;

pub use pit::{Pit, PitChannel, PitError, PitMode};
pub use ps2_keyboard::{pop_blocking, read_line, try_pop, KeyboardPipeline, ScancodeDecoder};
pub use speaker::{Note, Playback, Sleep, Song, Speaker};
