/// Fixed pool of page-aligned 4 KiB slots tracked by a bitmap
use core::ptr::{self, NonNull};

use super::core::{is_aligned, AllocError};
use crate::config::{PAGE_SIZE, PAGE_SLOTS};

const _: () = assert!(PAGE_SLOTS <= u32::BITS as usize);

pub struct PageSlots {
    base: usize,
    bitmap: u32,
}

impl PageSlots {
    pub const fn empty() -> Self {
        Self { base: 0, bitmap: 0 }
    }

    /// # Safety
    /// `base` must be page aligned and `PAGE_SLOTS` pages from it must be
    /// writable memory owned by this pool.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base, bitmap: 0 }
    }

    pub const fn base(&self) -> usize {
        self.base
    }

    pub const fn end(&self) -> usize {
        self.base + PAGE_SLOTS * PAGE_SIZE
    }

    pub fn used(&self) -> usize {
        self.bitmap.count_ones() as usize
    }

    pub fn contains(&self, addr: usize) -> bool {
        (self.base..self.end()).contains(&addr)
    }

    /// Lowest free slot, zero-filled.
    pub fn allocate(&mut self) -> Result<NonNull<u8>, AllocError> {
        if self.base == 0 {
            return Err(AllocError::Uninitialized);
        }
        let slot = (!self.bitmap).trailing_zeros() as usize;
        if slot >= PAGE_SLOTS {
            return Err(AllocError::OutOfPageSlots);
        }
        self.bitmap |= 1 << slot;

        let page = (self.base + slot * PAGE_SIZE) as *mut u8;
        unsafe {
            ptr::write_bytes(page, 0, PAGE_SIZE);
            Ok(NonNull::new_unchecked(page))
        }
    }

    pub fn release(&mut self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        let addr = ptr.as_ptr() as usize;
        if !self.contains(addr) || !is_aligned(addr - self.base, PAGE_SIZE) {
            return Err(AllocError::InvalidPointer);
        }
        let bit = 1u32 << ((addr - self.base) / PAGE_SIZE);
        if self.bitmap & bit == 0 {
            return Err(AllocError::DoubleFree);
        }
        self.bitmap &= !bit;
        Ok(())
    }
}

impl Default for PageSlots {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::{alloc_zeroed, dealloc, Layout};

    fn with_pool(test: impl FnOnce(&mut PageSlots)) {
        let layout = Layout::from_size_align(PAGE_SLOTS * PAGE_SIZE, PAGE_SIZE).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        let mut pool = unsafe { PageSlots::new(base as usize) };
        test(&mut pool);
        unsafe { dealloc(base, layout) };
    }

    #[test]
    fn empty_pool_is_uninitialised() {
        assert_eq!(PageSlots::empty().allocate(), Err(AllocError::Uninitialized));
    }

    #[test]
    fn hands_out_every_slot_once() {
        with_pool(|pool| {
            let mut seen = Vec::new();
            for _ in 0..PAGE_SLOTS {
                let page = pool.allocate().unwrap().as_ptr() as usize;
                assert_eq!(page % PAGE_SIZE, 0);
                assert!(pool.contains(page));
                assert!(!seen.contains(&page));
                seen.push(page);
            }
            assert_eq!(pool.allocate(), Err(AllocError::OutOfPageSlots));
            assert_eq!(pool.used(), PAGE_SLOTS);
        });
    }

    #[test]
    fn released_slot_comes_back_zeroed() {
        with_pool(|pool| {
            let first = pool.allocate().unwrap();
            let second = pool.allocate().unwrap();
            unsafe { second.as_ptr().add(100).write(0xEE) };

            pool.release(second).unwrap();
            let again = pool.allocate().unwrap();
            assert_eq!(again, second);
            assert_eq!(unsafe { again.as_ptr().add(100).read() }, 0);
            assert_ne!(again, first);
        });
    }

    #[test]
    fn rejects_foreign_misaligned_and_repeated_frees() {
        with_pool(|pool| {
            let page = pool.allocate().unwrap();
            let misaligned = NonNull::new(unsafe { page.as_ptr().add(8) }).unwrap();
            assert_eq!(pool.release(misaligned), Err(AllocError::InvalidPointer));

            let beyond = NonNull::new(pool.end() as *mut u8).unwrap();
            assert_eq!(pool.release(beyond), Err(AllocError::InvalidPointer));

            pool.release(page).unwrap();
            assert_eq!(pool.release(page), Err(AllocError::DoubleFree));
            assert_eq!(pool.used(), 0);
        });
    }
}
