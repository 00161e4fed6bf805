//! # kcore
//!
//! Core of a small 32-bit x86 teaching kernel: descriptor tables, interrupt
//! dispatch over the cascaded 8259 PICs, the PIT tick, the PS/2 keyboard
//! pipeline, the PC speaker and the kernel heap.
//!
//! ## Layout
//!
//! | Module              | Contents                                           |
//! |---------------------|----------------------------------------------------|
//! | `core::io`          | `PortIo` seam and the `Pio` port backend           |
//! | `core::cpu`         | `cli`/`sti`/`hlt` primitives                       |
//! | `core::interrupts`  | GDT, IDT, trampolines, PIC, dispatch, timer        |
//! | `core::kernel`      | init phases, status table, fatal sink, self tests  |
//! | `devices`           | PIT, PS/2 keyboard, speaker, key events            |
//! | `memory`            | kernel heap, page slots, identity paging           |
//! | `console`, `logger` | output sink, `print!`/`println!`, `log` backend    |
//!
//! Privileged instructions are only emitted for the bare-metal target
//! (`target_os = "none"`). Hosted builds keep the logic and swap hardware for
//! `testing::MockPorts`, which is how the unit tests run.

#![cfg_attr(target_os = "none", no_std)]

pub mod config;
#[macro_use]
pub mod console;
pub mod core;
pub mod devices;
pub mod logger;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::core::kernel::{fatal, init_kernel};
