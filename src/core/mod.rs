//! # Core Kernel Module
//!
//! Fundamental kernel infrastructure: port I/O, CPU control, interrupt
//! handling and kernel initialisation.
//!
//! ## Submodules
//!
//! - `io`: `PortIo` trait and the `Pio` backend
//! - `cpu`: interrupt flag and halt primitives
//! - `interrupts`: GDT, IDT, PIC, dispatch, timer
//! - `kernel`: initialisation phases, status tracking, fatal error sink
//!
//! ## Initialization Order
//!
//! 1. GDT (flat segments) and segment register reload
//! 2. IDT (all 256 gates point at trampolines)
//! 3. PIC remap to vectors 32..47
//! 4. PIT tick and keyboard handlers, then `sti`

pub mod cpu;
pub mod interrupts;
pub mod io;
pub mod kernel;
