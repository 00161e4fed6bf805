//! # Input Device Module
//!
//! Key events and the ring that carries them out of interrupt context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Keyboard   │  IRQ1: scancode -> KeyEvent
//! │   Driver     │
//! └──────┬───────┘
//!        │ push (producer)
//!        ▼
//! ┌──────────────────────────────────┐
//! │          KeyEventRing            │
//! │   drop-oldest, lock-free SPSC    │
//! └──────────────┬───────────────────┘
//!                │ pop (consumer)
//!                ▼
//! ┌──────────────────────────────────┐
//! │   try_pop / pop_blocking /       │
//! │   read_line                      │
//! └──────────────────────────────────┘
//! ```

/// Key events and the event ring
pub mod events;

pub use events::*;
