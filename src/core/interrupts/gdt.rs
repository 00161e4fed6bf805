//! # Global Descriptor Table
//!
//! Flat protected-mode segmentation: every segment has base 0, limit 4 GiB,
//! 4 KiB granularity and 32-bit default operand size.
//!
//! | Index | Selector | Segment     | Access |
//! |-------|----------|-------------|--------|
//! | 0     | 0x00     | null        | -      |
//! | 1     | 0x08     | kernel code | 0x9B   |
//! | 2     | 0x10     | kernel data | 0x93   |
//! | 3     | 0x1B     | user code   | 0xFB   |
//! | 4     | 0x23     | user data   | 0xF3   |
//!
//! The accessed bit is preset in every access byte, so loading a segment
//! never makes the CPU write into the table.

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use super::DescriptorTablePointer;

pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);

const GDT_ENTRIES: usize = 5;

/// Bit 0 of the access byte, set by the CPU on first use of the segment.
pub const ACCESS_ACCESSED: u8 = 0x01;

/// Access byte: present, ring 0, code, readable.
pub const ACCESS_KERNEL_CODE: u8 = 0x9A | ACCESS_ACCESSED;
/// Access byte: present, ring 0, data, writable.
pub const ACCESS_KERNEL_DATA: u8 = 0x92 | ACCESS_ACCESSED;
pub const ACCESS_USER_CODE: u8 = 0xFA | ACCESS_ACCESSED;
pub const ACCESS_USER_DATA: u8 = 0xF2 | ACCESS_ACCESSED;

/// Flags nibble: 4 KiB granularity, 32-bit segment.
const FLAGS_FLAT_32: u8 = 0xC;

/// One 8-byte segment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Descriptor(u64);

impl Descriptor {
    pub const NULL: Self = Self(0);

    pub const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        let limit = limit as u64 & 0xF_FFFF;
        let base = base as u64;
        Self(
            (limit & 0xFFFF)
                | (base & 0xFF_FFFF) << 16
                | (access as u64) << 40
                | (limit >> 16) << 48
                | ((flags & 0xF) as u64) << 52
                | (base >> 24) << 56,
        )
    }

    /// Base 0, limit 0xFFFFF pages.
    pub const fn flat(access: u8) -> Self {
        Self::new(0, 0xF_FFFF, access, FLAGS_FLAT_32)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn base(self) -> u32 {
        ((self.0 >> 16) & 0xFF_FFFF) as u32 | ((self.0 >> 56) as u32) << 24
    }

    /// Limit in units of the granularity (pages for flat segments).
    pub const fn limit(self) -> u32 {
        (self.0 & 0xFFFF) as u32 | (((self.0 >> 48) & 0xF) as u32) << 16
    }

    pub const fn access(self) -> u8 {
        (self.0 >> 40) as u8
    }

    pub const fn flags(self) -> u8 {
        ((self.0 >> 52) & 0xF) as u8
    }

    pub const fn dpl(self) -> u8 {
        (self.access() >> 5) & 0b11
    }

    pub const fn is_present(self) -> bool {
        self.access() & 0x80 != 0
    }

    /// Size of the segment in bytes, honouring the granularity bit.
    pub const fn byte_limit(self) -> u64 {
        if self.flags() & 0x8 != 0 {
            ((self.limit() as u64) << 12) | 0xFFF
        } else {
            self.limit() as u64
        }
    }
}

#[repr(C, align(8))]
pub struct GlobalDescriptorTable {
    entries: [Descriptor; GDT_ENTRIES],
}

impl GlobalDescriptorTable {
    pub const fn flat_model() -> Self {
        Self {
            entries: [
                Descriptor::NULL,
                Descriptor::flat(ACCESS_KERNEL_CODE),
                Descriptor::flat(ACCESS_KERNEL_DATA),
                Descriptor::flat(ACCESS_USER_CODE),
                Descriptor::flat(ACCESS_USER_DATA),
            ],
        }
    }

    pub fn entries(&self) -> &[Descriptor] {
        &self.entries
    }

    pub fn entry(&self, selector: SegmentSelector) -> Option<Descriptor> {
        self.entries.get(selector.index() as usize).copied()
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (core::mem::size_of_val(&self.entries) - 1) as u16,
            base: self.entries.as_ptr() as usize,
        }
    }

    /// Loads the table and reloads every segment register. CS is switched
    /// with a far return.
    ///
    /// # Safety
    /// Must run in ring 0 with interrupts disabled, and the table must stay
    /// at this address for the rest of the kernel's life.
    #[cfg(all(target_os = "none", target_arch = "x86"))]
    pub unsafe fn load(&'static self) {
        let pointer = self.pointer();
        unsafe {
            core::arch::asm!(
                "lgdt [{ptr}]",
                "mov ds, {data:x}",
                "mov es, {data:x}",
                "mov fs, {data:x}",
                "mov gs, {data:x}",
                "mov ss, {data:x}",
                "push {code}",
                "lea {tmp}, [2f]",
                "push {tmp}",
                "retf",
                "2:",
                ptr = in(reg) &pointer,
                data = in(reg) KERNEL_DATA_SELECTOR.0 as u32,
                code = in(reg) KERNEL_CODE_SELECTOR.0 as u32,
                tmp = out(reg) _,
            );
        }
    }
}

static GDT: GlobalDescriptorTable = GlobalDescriptorTable::flat_model();

pub fn table() -> &'static GlobalDescriptorTable {
    &GDT
}

pub fn init() {
    #[cfg(all(target_os = "none", target_arch = "x86"))]
    unsafe {
        GDT.load();
    }
    log::debug!(
        "GDT loaded: {} entries, code={:#x} data={:#x}",
        GDT_ENTRIES,
        KERNEL_CODE_SELECTOR.0,
        KERNEL_DATA_SELECTOR.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_descriptors_match_canonical_encodings() {
        let gdt = GlobalDescriptorTable::flat_model();
        let raw: Vec<u64> = gdt.entries().iter().map(|d| d.raw()).collect();
        assert_eq!(
            raw,
            vec![
                0,
                0x00CF_9B00_0000_FFFF,
                0x00CF_9300_0000_FFFF,
                0x00CF_FB00_0000_FFFF,
                0x00CF_F300_0000_FFFF,
            ]
        );
    }

    #[test]
    fn segments_are_already_marked_accessed() {
        for descriptor in table().entries().iter().skip(1) {
            assert_eq!(descriptor.access() & ACCESS_ACCESSED, ACCESS_ACCESSED);
        }
    }

    #[test]
    fn flat_segments_cover_four_gib() {
        for selector in [KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, USER_DATA_SELECTOR] {
            let descriptor = table().entry(selector).unwrap();
            assert!(descriptor.is_present());
            assert_eq!(descriptor.base(), 0);
            assert_eq!(descriptor.byte_limit(), 0xFFFF_FFFF);
        }
    }

    #[test]
    fn selector_privilege_matches_descriptor_dpl() {
        assert_eq!(KERNEL_CODE_SELECTOR.0, 0x08);
        assert_eq!(KERNEL_DATA_SELECTOR.0, 0x10);
        assert_eq!(USER_CODE_SELECTOR.0, 0x1B);
        assert_eq!(USER_DATA_SELECTOR.0, 0x23);
        assert_eq!(table().entry(USER_CODE_SELECTOR).unwrap().dpl(), 3);
        assert_eq!(table().entry(KERNEL_CODE_SELECTOR).unwrap().dpl(), 0);
    }

    #[test]
    fn base_and_limit_round_trip_through_the_split_fields() {
        let descriptor = Descriptor::new(0x1234_5678, 0xA_BCDE, 0x92, 0x4);
        assert_eq!(descriptor.base(), 0x1234_5678);
        assert_eq!(descriptor.limit(), 0xA_BCDE);
        assert_eq!(descriptor.access(), 0x92);
        assert_eq!(descriptor.flags(), 0x4);
        assert_eq!(descriptor.byte_limit(), 0xA_BCDE);
    }

    #[test]
    fn pointer_limit_is_size_minus_one() {
        let limit = table().pointer().limit;
        assert_eq!(limit, 5 * 8 - 1);
        assert!(table().entry(SegmentSelector::new(5, PrivilegeLevel::Ring0)).is_none());
    }
}
