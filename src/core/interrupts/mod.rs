//! # Interrupt Handling Module
//!
//! Provides interrupt infrastructure for the kernel including:
//!
//! - **GDT**: flat 32-bit segments for kernel and user mode
//! - **IDT**: 256 interrupt gates, each pointing at an entry trampoline
//! - **PIC**: 8259 pair remapped to vectors 32..47, EOI and masking
//! - **Dispatch**: handler table for exceptions and IRQ lines
//! - **Timer**: PIT-driven tick counter and sleep primitives
//!
//! ## Interrupt Vector Layout
//!
//! | Vector | Type                   | Handler                        |
//! |--------|------------------------|--------------------------------|
//! | 0-31   | CPU Exceptions         | registered, else fatal dump    |
//! | 32     | Timer (IRQ0)           | `timer::TimeSource::tick`      |
//! | 33     | Keyboard (IRQ1)        | `ps2_keyboard` decoder         |
//! | 34-47  | Other IRQ lines        | registered, else counted       |
//! | 48-255 | Unassigned             | counted and logged             |
//!
//! ## Usage
//!
//! ```ignore
//! use kcore::core::{cpu, interrupts};
//! interrupts::init(); // GDT, IDT, PIC
//! cpu::enable_interrupts();
//! ```

pub mod frame;
pub mod gdt;
pub mod idt;
#[allow(clippy::module_inception)]
pub mod interrupts;
pub mod pic;
#[cfg(all(target_os = "none", target_arch = "x86"))]
mod stubs;
pub mod timer;

pub use frame::RegisterFrame;
pub use interrupts::{register_exception, register_irq, InterruptError, InterruptHandler};

/// Operand of `lgdt`/`lidt`.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: usize,
}

/// Loads the descriptor tables and remaps the PICs. Interrupts stay disabled.
pub fn init() {
    gdt::init();
    idt::init_idt();
    interrupts::init_pics();
}
