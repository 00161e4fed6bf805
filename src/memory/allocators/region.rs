//! Owned heap regions that give their memory back when dropped.

use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::slice;

use super::core::AllocError;
use super::heap::KernelAllocator;
use crate::config::PAGE_SIZE;

/// `len` zero-initialised bytes from the block heap.
pub struct HeapRegion<'h> {
    heap: &'h KernelAllocator,
    ptr: NonNull<u8>,
    len: usize,
}

impl<'h> HeapRegion<'h> {
    pub fn new_in(heap: &'h KernelAllocator, len: usize) -> Result<Self, AllocError> {
        let ptr = heap.lock().allocate(len)?;
        Ok(Self { heap, ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Deref for HeapRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for HeapRegion<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for HeapRegion<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.heap.lock().release(self.ptr) {
            log::error!("heap region {:p}: {}", self.ptr, err);
        }
    }
}

/// One page slot.
pub struct PageRegion<'h> {
    heap: &'h KernelAllocator,
    ptr: NonNull<u8>,
}

impl<'h> PageRegion<'h> {
    pub fn new_in(heap: &'h KernelAllocator) -> Result<Self, AllocError> {
        let ptr = heap.lock().allocate_page()?;
        Ok(Self { heap, ptr })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Physical address under the identity map.
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl Deref for PageRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), PAGE_SIZE) }
    }
}

impl DerefMut for PageRegion<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), PAGE_SIZE) }
    }
}

impl Drop for PageRegion<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.heap.lock().release_page(self.ptr) {
            log::error!("page region {:p}: {}", self.ptr, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::allocators::heap::tests::TestRegion;

    fn allocator(region: &TestRegion) -> KernelAllocator {
        let allocator = KernelAllocator::new();
        unsafe { allocator.lock().init(region.heap_layout()) };
        allocator
    }

    #[test]
    fn heap_region_frees_on_drop() {
        let region = TestRegion::new(4);
        let heap = allocator(&region);
        {
            let mut bytes = HeapRegion::new_in(&heap, 100).unwrap();
            assert_eq!(bytes.len(), 100);
            assert!(bytes.iter().all(|&b| b == 0));
            bytes[..5].copy_from_slice(b"hello");
            assert_eq!(&bytes[..5], b"hello");
            assert_eq!(heap.lock().bytes_used(), 112);
        }
        assert_eq!(heap.lock().bytes_used(), 0);
    }

    #[test]
    fn zero_length_region_is_refused() {
        let region = TestRegion::new(4);
        let heap = allocator(&region);
        assert_eq!(HeapRegion::new_in(&heap, 0).err(), Some(AllocError::ZeroSize));
    }

    #[test]
    fn page_region_is_a_whole_aligned_page() {
        let region = TestRegion::new(4);
        let heap = allocator(&region);
        {
            let mut page = PageRegion::new_in(&heap).unwrap();
            assert_eq!(page.len(), PAGE_SIZE);
            assert_eq!(page.address() % PAGE_SIZE, 0);
            page[PAGE_SIZE - 1] = 7;
            assert_eq!(heap.lock().pages_used(), 1);
        }
        assert_eq!(heap.lock().pages_used(), 0);
    }
}
