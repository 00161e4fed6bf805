//! # Kernel Memory
//!
//! The kernel heap lives between the end of the loaded image and
//! `config::HEAP_HIGH_WATER`. Its top 32 pages are reserved for
//! `page_alloc`. Everything below 8 MiB is identity mapped once `paging`
//! is enabled, so heap addresses are physical addresses.
//!
//! Two ways in:
//!
//! - the byte API (`alloc`, `free`, `page_alloc`, `page_free`), where
//!   running out of memory or freeing a foreign pointer is fatal;
//! - owned handles (`region`, `page`) that report errors and release on drop.
//!
//! `KERNEL_HEAP` is also the `#[global_allocator]` of the bare-metal build.
//! None of this may be called from interrupt context.

use core::ptr::{self, NonNull};

pub mod allocators;
pub mod paging;

pub use allocators::{AllocError, HeapLayout, HeapRegion, HeapStats, KernelAllocator, PageRegion};

use crate::config::HEAP_HIGH_WATER;
use crate::core::kernel::fatal;
use allocators::ByteSize;

#[cfg_attr(target_os = "none", global_allocator)]
pub static KERNEL_HEAP: KernelAllocator = KernelAllocator::new();

/// Sets up the heap above `kernel_end`.
///
/// # Safety
/// Everything from one page past `kernel_end` up to `HEAP_HIGH_WATER` must
/// be unused RAM. Must run once, before any allocation.
pub unsafe fn init(kernel_end: usize) -> Result<HeapLayout, AllocError> {
    let layout = HeapLayout::for_kernel_end(kernel_end, HEAP_HIGH_WATER)?;
    unsafe { KERNEL_HEAP.lock().init(layout) };
    log::info!(
        "heap: {:#x}..{:#x} ({}), page slots at {:#x}",
        layout.heap_begin,
        layout.heap_end,
        ByteSize(layout.heap_size()),
        layout.page_slot_base
    );
    Ok(layout)
}

pub fn try_alloc(size: usize) -> Result<NonNull<u8>, AllocError> {
    KERNEL_HEAP.lock().allocate(size)
}

/// Zeroed block of at least `size` bytes. Null for `size == 0`.
pub fn alloc(size: usize) -> *mut u8 {
    if size == 0 {
        return ptr::null_mut();
    }
    match try_alloc(size) {
        Ok(block) => block.as_ptr(),
        Err(err) => fatal::halt_fmt(format_args!("alloc({}): {}", size, err)),
    }
}

/// Freeing null is a no-op.
pub fn free(ptr: *mut u8) {
    let Some(block) = NonNull::new(ptr) else {
        return;
    };
    let released = KERNEL_HEAP.lock().release(block);
    if let Err(err) = released {
        fatal::halt_fmt(format_args!("free({:p}): {}", ptr, err));
    }
}

pub fn page_alloc() -> *mut u8 {
    let page = KERNEL_HEAP.lock().allocate_page();
    match page {
        Ok(page) => page.as_ptr(),
        Err(err) => fatal::halt_fmt(format_args!("page_alloc: {}", err)),
    }
}

pub fn page_free(ptr: *mut u8) {
    let Some(page) = NonNull::new(ptr) else {
        return;
    };
    let released = KERNEL_HEAP.lock().release_page(page);
    if let Err(err) = released {
        fatal::halt_fmt(format_args!("page_free({:p}): {}", ptr, err));
    }
}

pub fn region(len: usize) -> Result<HeapRegion<'static>, AllocError> {
    HeapRegion::new_in(&KERNEL_HEAP, len)
}

pub fn page() -> Result<PageRegion<'static>, AllocError> {
    PageRegion::new_in(&KERNEL_HEAP)
}

pub fn bytes_used() -> usize {
    KERNEL_HEAP.lock().bytes_used()
}

pub fn stats() -> HeapStats {
    KERNEL_HEAP.lock().stats()
}

pub fn print_memory_layout() {
    let stats = stats();
    crate::console::write_fmt(format_args!(
        "Memory used: {}\nMemory free: {}\nHeap: {:#x} - {:#x}\nPages: {:#x} - {:#x} ({} in use)\n",
        ByteSize(stats.bytes_used),
        ByteSize(stats.bytes_free),
        stats.heap_begin,
        stats.heap_end,
        stats.page_slot_base,
        stats.page_slot_base + crate::config::PAGE_SLOTS * crate::config::PAGE_SIZE,
        stats.pages_used
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::captured;

    #[test]
    fn zero_sized_and_null_requests_do_nothing() {
        assert!(alloc(0).is_null());
        free(ptr::null_mut());
        page_free(ptr::null_mut());
    }

    #[test]
    #[should_panic(expected = "alloc(16): heap not initialised")]
    fn allocating_before_init_is_fatal() {
        alloc(16);
    }

    #[test]
    fn handles_report_errors_instead() {
        assert_eq!(region(16).err(), Some(AllocError::Uninitialized));
        assert_eq!(try_alloc(16), Err(AllocError::Uninitialized));
    }

    #[test]
    fn layout_report_uses_human_units() {
        let out = captured(print_memory_layout);
        assert!(out.starts_with("Memory used: 0 bytes\nMemory free: 0 bytes\nHeap: 0x0 - 0x0\n"), "{}", out);
    }
}
