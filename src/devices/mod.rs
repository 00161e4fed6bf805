//! Device Subsystem
//!
//! Hardware device drivers and abstractions:
//! - `drivers`: PIT, PS/2 keyboard, keymap, PC speaker
//! - `input`: key event types and the IRQ-to-kernel event ring

pub mod drivers;
pub mod input;
