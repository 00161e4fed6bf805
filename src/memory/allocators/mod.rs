//! # Memory Allocators
//!
//! ## KernelHeap
//! - First-fit over headed blocks between `heap_begin` and the cursor
//! - Freed blocks are reused in place, never split or merged
//! - Every allocation is zero-filled
//!
//! ## PageSlots
//! - 32 page-aligned 4 KiB slots at the top of the heap region
//! - Bitmap occupancy
//!
//! ## Regions
//! - `HeapRegion` / `PageRegion`: owned allocations released on drop
//!
//! ## Core Utilities
//!
//! - `AllocError`: Allocation failure types
//! - Alignment helpers: `align_up`, `align_down`

pub mod core;
pub mod heap;
pub mod pages;
pub mod region;

pub use self::core::{AllocError, ByteSize};
pub use heap::{HeapLayout, HeapStats, KernelAllocator, KernelHeap};
pub use pages::PageSlots;
pub use region::{HeapRegion, PageRegion};
