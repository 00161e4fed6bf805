//! # Kernel Initialization Module
//!
//! Provides kernel bootstrap, status tracking and the fatal error sink.
//!
//! ## Submodules
//!
//! - `init`: Kernel initialization sequence
//! - `status`: Component status tracking for boot progress
//! - `fatal`: `halt_with` / `halt_fmt`, the only way out of an unrecoverable error
//! - `selftest`: on-hardware checks (feature `selftest`)
//!
//! ## Status Tracking
//!
//! Every init phase is registered up front and moves through
//! `NotStarted -> InProgress -> Completed | Failed(reason)`.
//!
//! ## Example
//!
//! ```ignore
//! use kcore::core::kernel::{get_all_statuses, init_kernel};
//!
//! init_kernel(kernel_end)?;
//! for component in get_all_statuses().iter() {
//!     println!("{:<22} {}", component.name, component.status);
//! }
//! ```

pub mod fatal;
pub mod init;
#[cfg(feature = "selftest")]
pub mod selftest;
pub mod status;

pub use init::{init_kernel, InitError};
pub use status::{get_all_statuses, ComponentStatus, InitStatus, StatusTable};
