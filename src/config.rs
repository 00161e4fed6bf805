//! Compile-time configuration for the kernel core.

use log::LevelFilter;

/// System tick rate programmed into PIT channel 0.
pub const TIMER_HZ: u32 = 1000;

/// Input clock of the 8253/8254 PIT.
pub const PIT_BASE_HZ: u32 = 1_193_180;

/// Number of slots in the keyboard event ring. Must be a power of two.
pub const KEY_RING_CAPACITY: usize = 64;

pub const PAGE_SIZE: usize = 4096;

/// Page-aligned slots carved from the top of the heap for `page_alloc`.
pub const PAGE_SLOTS: usize = 32;

/// End of the kernel heap (page slots included): 4 MiB minus a 64 KiB reserve.
pub const HEAP_HIGH_WATER: usize = 0x0040_0000 - 0x0001_0000;

/// Bytes identity-mapped by `memory::paging`, counted from address zero.
pub const IDENTITY_MAP_BYTES: usize = 8 * 1024 * 1024;

/// Silence inserted after every note of a song.
pub const INTER_NOTE_GAP_MS: u32 = 10;

/// Granularity of cancellable song playback.
pub const PLAYBACK_SLICE_MS: u32 = 10;

pub const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// COM1.
pub const SERIAL_PORT_BASE: u16 = 0x3F8;

/// Unknown vectors are logged individually up to this count, then only at
/// powers of two.
pub const UNKNOWN_VECTOR_LOG_LIMIT: u32 = 8;
