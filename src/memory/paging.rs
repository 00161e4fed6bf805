//! Identity mapping of low memory with 4 KiB pages (32-bit, non-PAE).
//!
//! One page directory plus one page table per 4 MiB of
//! `config::IDENTITY_MAP_BYTES`. Nothing above that is mapped, so touching
//! it after `enable` page-faults.

use spin::Mutex;

use crate::config::{IDENTITY_MAP_BYTES, PAGE_SIZE};

pub const ENTRIES: usize = 1024;
pub const PRESENT: u32 = 1 << 0;
pub const WRITABLE: u32 = 1 << 1;

/// Bytes covered by one page table.
pub const TABLE_SPAN: usize = ENTRIES * PAGE_SIZE;
pub const IDENTITY_TABLES: usize = IDENTITY_MAP_BYTES / TABLE_SPAN;

const _: () = assert!(IDENTITY_MAP_BYTES % TABLE_SPAN == 0);
const _: () = assert!(IDENTITY_TABLES <= ENTRIES);

const FRAME_MASK: u32 = !0xFFF;

/// Directory or table entry pointing at a 4 KiB aligned frame.
pub const fn entry(frame: u32, flags: u32) -> u32 {
    (frame & FRAME_MASK) | (flags & 0xFFF)
}

#[repr(C, align(4096))]
#[derive(Clone, Copy)]
pub struct PageTable {
    entries: [u32; ENTRIES],
}

impl PageTable {
    pub const fn empty() -> Self {
        Self { entries: [0; ENTRIES] }
    }

    pub fn entry(&self, index: usize) -> u32 {
        self.entries[index]
    }

    fn address(&self) -> u32 {
        self.entries.as_ptr() as usize as u32
    }
}

pub struct IdentityMap<const T: usize> {
    directory: PageTable,
    tables: [PageTable; T],
}

impl<const T: usize> IdentityMap<T> {
    pub const fn new() -> Self {
        Self {
            directory: PageTable::empty(),
            tables: [PageTable::empty(); T],
        }
    }

    /// Fills the tables so virtual == physical for the first `T * 4 MiB`.
    /// Directory entries hold the tables' own addresses, which are only
    /// meaningful when this structure itself lives in identity-mapped memory.
    pub fn build(&mut self) {
        for (t, table) in self.tables.iter_mut().enumerate() {
            for (i, slot) in table.entries.iter_mut().enumerate() {
                let frame = (t * TABLE_SPAN + i * PAGE_SIZE) as u32;
                *slot = entry(frame, PRESENT | WRITABLE);
            }
        }
        for t in 0..T {
            self.directory.entries[t] = entry(self.tables[t].address(), PRESENT | WRITABLE);
        }
    }

    pub fn directory(&self) -> &PageTable {
        &self.directory
    }

    pub fn directory_address(&self) -> u32 {
        self.directory.address()
    }

    pub const fn mapped_bytes(&self) -> usize {
        T * TABLE_SPAN
    }

    /// Walks the structure by index, the way the MMU would.
    pub fn translate(&self, virt: u32) -> Option<u32> {
        let dir = (virt >> 22) as usize;
        let idx = ((virt >> 12) & 0x3FF) as usize;
        if self.directory.entries[dir] & PRESENT == 0 {
            return None;
        }
        let pte = self.tables.get(dir)?.entries[idx];
        (pte & PRESENT != 0).then_some((pte & FRAME_MASK) | (virt & 0xFFF))
    }
}

impl<const T: usize> Default for IdentityMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

static KERNEL_MAP: Mutex<IdentityMap<IDENTITY_TABLES>> = Mutex::new(IdentityMap::new());

/// Builds the identity map and turns paging on. Returns the mapped size.
pub fn init() -> usize {
    let mut map = KERNEL_MAP.lock();
    map.build();
    unsafe { enable(map.directory_address()) };
    log::info!("paging: identity mapped {} MiB", map.mapped_bytes() / (1024 * 1024));
    map.mapped_bytes()
}

/// # Safety
/// `directory` must point at a valid page directory that maps the running
/// code and stack.
#[cfg(all(target_os = "none", target_arch = "x86"))]
unsafe fn enable(directory: u32) {
    unsafe {
        core::arch::asm!(
            "mov cr3, {dir}",
            "mov {tmp}, cr0",
            "or {tmp}, 0x80000000",
            "mov cr0, {tmp}",
            dir = in(reg) directory,
            tmp = out(reg) _,
            options(nostack),
        );
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86")))]
unsafe fn enable(_directory: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_frame_and_flags_apart() {
        assert_eq!(entry(0x0040_1000, PRESENT | WRITABLE), 0x0040_1003);
        assert_eq!(entry(0x0040_1FFF, PRESENT), 0x0040_1001);
        assert_eq!(entry(0, 0), 0);
    }

    #[test]
    fn default_map_covers_eight_mib() {
        assert_eq!(IDENTITY_TABLES, 2);
        let map: Box<IdentityMap<IDENTITY_TABLES>> = Box::default();
        assert_eq!(map.mapped_bytes(), 8 * 1024 * 1024);
    }

    #[test]
    fn low_memory_is_identity_mapped() {
        let mut map: Box<IdentityMap<2>> = Box::default();
        map.build();

        for virt in [0u32, 0xB8000, 0x0010_0000, 0x003F_FFFF, 0x0040_0000, 0x007F_F123] {
            assert_eq!(map.translate(virt), Some(virt), "{:#x}", virt);
        }
        assert_eq!(map.translate(0x0080_0000), None);
        assert_eq!(map.translate(0xFFFF_F000), None);
    }

    #[test]
    fn directory_points_at_tables() {
        let mut map: Box<IdentityMap<2>> = Box::default();
        map.build();

        let dir = map.directory();
        assert_eq!(dir.entry(0) & 0xFFF, PRESENT | WRITABLE);
        assert_eq!(dir.entry(0) & FRAME_MASK, map.tables[0].address());
        assert_eq!(dir.entry(2), 0);
        assert_eq!(map.tables[1].entry(5), ((1024 + 5) * 4096) as u32 | 3);
    }
}
