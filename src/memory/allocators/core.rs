/// Core utilities and error types for allocators
use core::fmt;

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// `align` must be a power of two. Returns `None` on overflow.
#[inline]
pub const fn align_up(addr: usize, align: usize) -> Option<usize> {
    match addr.checked_add(align - 1) {
        Some(bumped) => Some(bumped & !(align - 1)),
        None => None,
    }
}

#[inline]
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

#[inline]
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

/// Validates that a memory region is usable as a heap
pub fn validate_region(start: usize, size: usize) -> Result<usize, AllocError> {
    if start == 0 {
        return Err(AllocError::InvalidPointer);
    }
    if size == 0 {
        return Err(AllocError::RegionTooSmall);
    }
    start.checked_add(size).ok_or(AllocError::Overflow)
}

/// Human-readable byte count: bytes, KB, or MB with one decimal.
pub struct ByteSize(pub usize);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: usize = 1024;
        const MB: usize = 1024 * 1024;
        match self.0 {
            n if n < KB => write!(f, "{} bytes", n),
            n if n < MB => write!(f, "{} KB", n / KB),
            n => write!(f, "{}.{} MB", n / MB, (n % MB) * 10 / MB),
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    ZeroSize,
    OutOfMemory,
    OutOfPageSlots,
    /// Not a pointer this allocator handed out.
    InvalidPointer,
    DoubleFree,
    Uninitialized,
    RegionTooSmall,
    Overflow,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::ZeroSize => "zero-sized allocation",
            AllocError::OutOfMemory => "out of memory",
            AllocError::OutOfPageSlots => "out of page-aligned slots",
            AllocError::InvalidPointer => "pointer was not allocated here",
            AllocError::DoubleFree => "block already free",
            AllocError::Uninitialized => "heap not initialised",
            AllocError::RegionTooSmall => "heap region too small",
            AllocError::Overflow => "address arithmetic overflow",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0x1001, 0x1000), Some(0x2000));
        assert_eq!(align_up(0x1000, 0x1000), Some(0x1000));
        assert_eq!(align_up(usize::MAX, 8), None);
        assert_eq!(align_down(0x1FFF, 0x1000), 0x1000);
        assert!(is_aligned(0x3000, 0x1000));
        assert!(!is_aligned(0x3004, 8));
    }

    #[test]
    fn region_validation() {
        assert_eq!(validate_region(0, 16), Err(AllocError::InvalidPointer));
        assert_eq!(validate_region(0x1000, 0), Err(AllocError::RegionTooSmall));
        assert_eq!(validate_region(usize::MAX, 2), Err(AllocError::Overflow));
        assert_eq!(validate_region(0x1000, 0x1000), Ok(0x2000));
    }

    #[test]
    fn byte_sizes_pick_a_unit() {
        assert_eq!(format!("{}", ByteSize(512)), "512 bytes");
        assert_eq!(format!("{}", ByteSize(4096)), "4 KB");
        assert_eq!(format!("{}", ByteSize(3 * 1024 * 1024 + 512 * 1024)), "3.5 MB");
    }
}
