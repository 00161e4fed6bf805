//! First-fit kernel heap with per-block headers.
//!
//! ```text
//! heap_begin                      cursor            heap_end = page_slot_base
//! │ hdr │ payload │ hdr │ payload │ ...   (zeroed)  │ slot 0 │ ... │ slot 31 │
//! ```
//!
//! Every block starts with an 8-byte [`BlockHeader`] holding its status and
//! capacity. Capacities are rounded up to 8 bytes, so walking
//! `header + capacity` from `heap_begin` visits every block and every
//! payload is 8-byte aligned. Blocks are never split or merged; a freed
//! block is reused by the first later request that fits in it.
//!
//! The top of the region holds the [`PageSlots`] pool.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use spin::{Mutex, MutexGuard};

use super::core::{align_down, align_up, validate_region, AllocError};
use super::pages::PageSlots;
use crate::config::{PAGE_SIZE, PAGE_SLOTS};

pub const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();
pub const BLOCK_ALIGN: usize = 8;

const STATUS_FREE: u32 = 0x4652_4545;
const STATUS_USED: u32 = 0x5553_4544;

const _: () = assert!(HEADER_SIZE == 8);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    status: u32,
    size: u32,
}

/// Capacity a request of `size` bytes occupies.
pub const fn block_size(size: usize) -> Option<usize> {
    align_up(size, BLOCK_ALIGN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapLayout {
    pub heap_begin: usize,
    pub heap_end: usize,
    pub page_slot_base: usize,
}

impl HeapLayout {
    /// Heap from one page past the end of the kernel image up to the page
    /// slots, which sit just below `high_water` (rounded down to a page).
    pub fn for_kernel_end(kernel_end: usize, high_water: usize) -> Result<Self, AllocError> {
        let heap_begin = align_up(kernel_end, PAGE_SIZE)
            .and_then(|end| end.checked_add(PAGE_SIZE))
            .ok_or(AllocError::Overflow)?;
        let page_slot_base = align_down(high_water, PAGE_SIZE)
            .checked_sub(PAGE_SLOTS * PAGE_SIZE)
            .ok_or(AllocError::RegionTooSmall)?;
        if page_slot_base <= heap_begin + HEADER_SIZE {
            return Err(AllocError::RegionTooSmall);
        }
        validate_region(heap_begin, page_slot_base - heap_begin)?;

        Ok(Self {
            heap_begin,
            heap_end: page_slot_base,
            page_slot_base,
        })
    }

    pub const fn heap_size(&self) -> usize {
        self.heap_end - self.heap_begin
    }

    pub const fn page_slot_end(&self) -> usize {
        self.page_slot_base + PAGE_SLOTS * PAGE_SIZE
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub bytes_used: usize,
    pub bytes_free: usize,
    pub live_blocks: usize,
    pub heap_begin: usize,
    pub heap_end: usize,
    pub cursor: usize,
    pub pages_used: usize,
    pub page_slot_base: usize,
}

pub struct KernelHeap {
    layout: Option<HeapLayout>,
    cursor: usize,
    bytes_used: usize,
    live_blocks: usize,
    pages: PageSlots,
}

impl KernelHeap {
    pub const fn new() -> Self {
        Self {
            layout: None,
            cursor: 0,
            bytes_used: 0,
            live_blocks: 0,
            pages: PageSlots::empty(),
        }
    }

    /// Takes ownership of the memory described by `layout` and zero-fills
    /// the block area.
    ///
    /// # Safety
    /// `[heap_begin, page_slot_end)` must be writable memory used by nothing
    /// else for as long as this heap is in use.
    pub unsafe fn init(&mut self, layout: HeapLayout) {
        unsafe {
            ptr::write_bytes(layout.heap_begin as *mut u8, 0, layout.heap_size());
        }
        self.layout = Some(layout);
        self.cursor = layout.heap_begin;
        self.bytes_used = 0;
        self.live_blocks = 0;
        self.pages = unsafe { PageSlots::new(layout.page_slot_base) };
    }

    pub fn is_initialized(&self) -> bool {
        self.layout.is_some()
    }

    pub fn layout(&self) -> Option<HeapLayout> {
        self.layout
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// End of the carved area; new blocks are created here.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn header_at(&mut self, addr: usize) -> &mut BlockHeader {
        // Only called for addresses reached by walking from heap_begin.
        unsafe { &mut *(addr as *mut BlockHeader) }
    }

    /// Returns a zeroed, 8-byte aligned region of at least `size` bytes.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let layout = self.layout.ok_or(AllocError::Uninitialized)?;
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        let capacity = block_size(size).ok_or(AllocError::Overflow)?;
        let capacity_u32 = u32::try_from(capacity).map_err(|_| AllocError::OutOfMemory)?;

        // First fit over the blocks carved so far.
        let mut addr = layout.heap_begin;
        while addr < self.cursor {
            let header = self.header_at(addr);
            let block = header.size as usize;
            if header.status == STATUS_FREE && block >= capacity {
                header.status = STATUS_USED;
                return Ok(self.hand_out(addr, block));
            }
            addr += HEADER_SIZE + block;
        }

        let end = self
            .cursor
            .checked_add(HEADER_SIZE + capacity)
            .ok_or(AllocError::Overflow)?;
        if end > layout.heap_end {
            return Err(AllocError::OutOfMemory);
        }

        let block_addr = self.cursor;
        *self.header_at(block_addr) = BlockHeader {
            status: STATUS_USED,
            size: capacity_u32,
        };
        self.cursor = end;
        Ok(self.hand_out(block_addr, capacity))
    }

    fn hand_out(&mut self, block_addr: usize, capacity: usize) -> NonNull<u8> {
        let payload = (block_addr + HEADER_SIZE) as *mut u8;
        unsafe {
            ptr::write_bytes(payload, 0, capacity);
        }
        self.bytes_used += HEADER_SIZE + capacity;
        self.live_blocks += 1;
        // Inside the heap, never null.
        unsafe { NonNull::new_unchecked(payload) }
    }

    /// Marks the block owning `ptr` free and returns its capacity.
    pub fn release(&mut self, ptr: NonNull<u8>) -> Result<usize, AllocError> {
        let layout = self.layout.ok_or(AllocError::Uninitialized)?;
        let target = ptr.as_ptr() as usize;
        if target < layout.heap_begin + HEADER_SIZE || target >= self.cursor {
            return Err(AllocError::InvalidPointer);
        }

        let mut addr = layout.heap_begin;
        while addr < self.cursor {
            let header = self.header_at(addr);
            let block = header.size as usize;
            let payload = addr + HEADER_SIZE;
            if payload == target {
                if header.status != STATUS_USED {
                    return Err(AllocError::DoubleFree);
                }
                header.status = STATUS_FREE;
                self.bytes_used -= HEADER_SIZE + block;
                self.live_blocks -= 1;
                return Ok(block);
            }
            if payload > target {
                break;
            }
            addr = payload + block;
        }
        Err(AllocError::InvalidPointer)
    }

    /// Capacity of the live block at `ptr`.
    pub fn capacity_of(&mut self, ptr: NonNull<u8>) -> Option<usize> {
        let layout = self.layout?;
        let target = ptr.as_ptr() as usize;
        let mut addr = layout.heap_begin;
        while addr < self.cursor {
            let header = *self.header_at(addr);
            let payload = addr + HEADER_SIZE;
            if payload == target {
                return (header.status == STATUS_USED).then_some(header.size as usize);
            }
            addr = payload + header.size as usize;
        }
        None
    }

    /// One zeroed, page-aligned 4 KiB slot.
    pub fn allocate_page(&mut self) -> Result<NonNull<u8>, AllocError> {
        self.layout.ok_or(AllocError::Uninitialized)?;
        self.pages.allocate()
    }

    pub fn release_page(&mut self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        self.layout.ok_or(AllocError::Uninitialized)?;
        self.pages.release(ptr)
    }

    pub fn pages_used(&self) -> usize {
        self.pages.used()
    }

    pub fn stats(&self) -> HeapStats {
        match self.layout {
            Some(layout) => HeapStats {
                bytes_used: self.bytes_used,
                bytes_free: layout.heap_size() - self.bytes_used,
                live_blocks: self.live_blocks,
                heap_begin: layout.heap_begin,
                heap_end: layout.heap_end,
                cursor: self.cursor,
                pages_used: self.pages_used(),
                page_slot_base: layout.page_slot_base,
            },
            None => HeapStats::default(),
        }
    }
}

impl Default for KernelHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// The heap behind a spin lock, usable as `#[global_allocator]`.
///
/// Layouts aligned to at most 8 bytes come from the block heap. Requests
/// that fit in a page and need more alignment than that come from the page
/// slots. Anything else fails.
pub struct KernelAllocator {
    inner: Mutex<KernelHeap>,
}

impl KernelAllocator {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(KernelHeap::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, KernelHeap> {
        self.inner.lock()
    }

    fn from_pages(layout: &Layout) -> bool {
        layout.align() > BLOCK_ALIGN
    }
}

impl Default for KernelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut heap = self.lock();
        let result = if !Self::from_pages(&layout) {
            heap.allocate(layout.size().max(1))
        } else if layout.align() <= PAGE_SIZE && layout.size() <= PAGE_SIZE {
            heap.allocate_page()
        } else {
            Err(AllocError::OutOfMemory)
        };
        result.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        let mut heap = self.lock();
        let result = if Self::from_pages(&layout) {
            heap.release_page(ptr)
        } else {
            heap.release(ptr).map(|_| ())
        };
        if let Err(err) = result {
            log::error!("dealloc {:p}: {}", ptr, err);
        }
    }

    // Blocks and pages are zeroed on the way out already.
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        unsafe { self.alloc(layout) }
    }
}
