//! # Interrupt Descriptor Table
//!
//! 256 eight-byte 32-bit interrupt gates. Every vector points at an entry
//! trampoline, so even vectors nobody registered for reach
//! `interrupt_dispatch`, which logs and ignores them.

use spin::Lazy;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use super::{gdt, DescriptorTablePointer};

pub const IDT_ENTRIES: usize = 256;

/// Gate type nibble for a 32-bit interrupt gate (IF cleared on entry).
const GATE_INTERRUPT_32: u8 = 0xE;
const GATE_PRESENT: u8 = 0x80;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    reserved: u8,
    flags: u8,
    offset_high: u16,
}

impl GateDescriptor {
    /// Not present; taking this vector raises #NP.
    pub const MISSING: Self = Self {
        offset_low: 0,
        selector: 0,
        reserved: 0,
        flags: 0,
        offset_high: 0,
    };

    pub const fn interrupt_gate(handler: u32, selector: SegmentSelector, dpl: PrivilegeLevel) -> Self {
        Self {
            offset_low: handler as u16,
            selector: selector.0,
            reserved: 0,
            flags: GATE_PRESENT | (dpl as u8) << 5 | GATE_INTERRUPT_32,
            offset_high: (handler >> 16) as u16,
        }
    }

    pub const fn handler_address(&self) -> u32 {
        self.offset_low as u32 | (self.offset_high as u32) << 16
    }

    pub const fn selector(&self) -> u16 {
        self.selector
    }

    pub const fn flags(&self) -> u8 {
        self.flags
    }

    pub const fn is_present(&self) -> bool {
        self.flags & GATE_PRESENT != 0
    }
}

#[repr(C, align(8))]
pub struct InterruptDescriptorTable {
    gates: [GateDescriptor; IDT_ENTRIES],
}

impl InterruptDescriptorTable {
    pub const fn new() -> Self {
        Self {
            gates: [GateDescriptor::MISSING; IDT_ENTRIES],
        }
    }

    /// Points every vector at `trampoline(vector)` through a ring-0
    /// interrupt gate in the kernel code segment.
    pub fn populate<F>(&mut self, trampoline: F)
    where
        F: Fn(u8) -> u32,
    {
        for (vector, gate) in self.gates.iter_mut().enumerate() {
            *gate = GateDescriptor::interrupt_gate(
                trampoline(vector as u8),
                gdt::KERNEL_CODE_SELECTOR,
                PrivilegeLevel::Ring0,
            );
        }
    }

    pub fn set_gate(&mut self, vector: u8, gate: GateDescriptor) {
        self.gates[vector as usize] = gate;
    }

    pub fn gate(&self, vector: u8) -> &GateDescriptor {
        &self.gates[vector as usize]
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (core::mem::size_of_val(&self.gates) - 1) as u16,
            base: self.gates.as_ptr() as usize,
        }
    }

    /// # Safety
    /// The table must live for the rest of the kernel's life and every
    /// present gate must point at a valid trampoline.
    #[cfg(all(target_os = "none", target_arch = "x86"))]
    pub unsafe fn load(&'static self) {
        let pointer = self.pointer();
        unsafe {
            core::arch::asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
        }
    }
}

impl Default for InterruptDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(target_os = "none", target_arch = "x86"))]
static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(|| {
    let mut idt = InterruptDescriptorTable::new();
    idt.populate(super::stubs::trampoline_address);
    idt
});

#[cfg(not(all(target_os = "none", target_arch = "x86")))]
static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(InterruptDescriptorTable::new);

pub fn init_idt() {
    let idt = &*IDT;
    #[cfg(all(target_os = "none", target_arch = "x86"))]
    unsafe {
        idt.load();
    }
    log::debug!("IDT loaded at {:#x}", idt.gates.as_ptr() as usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_trampoline(vector: u8) -> u32 {
        0x0010_0000 + vector as u32 * 16
    }

    #[test]
    fn gate_encodes_ring0_interrupt_gate() {
        let gate = GateDescriptor::interrupt_gate(0xC010_2030, gdt::KERNEL_CODE_SELECTOR, PrivilegeLevel::Ring0);
        assert_eq!(gate.flags(), 0x8E);
        assert_eq!(gate.selector(), 0x08);
        assert_eq!(gate.handler_address(), 0xC010_2030);
        assert_eq!(core::mem::size_of::<GateDescriptor>(), 8);
    }

    #[test]
    fn new_table_has_no_present_gates() {
        let idt = InterruptDescriptorTable::new();
        assert!((0..=255u8).all(|v| !idt.gate(v).is_present()));
    }

    #[test]
    fn populate_fills_every_vector() {
        let mut idt = InterruptDescriptorTable::new();
        idt.populate(fake_trampoline);
        for vector in 0..=255u8 {
            let gate = idt.gate(vector);
            assert!(gate.is_present());
            assert_eq!(gate.handler_address(), fake_trampoline(vector));
        }
        let limit = idt.pointer().limit;
        assert_eq!(limit, 256 * 8 - 1);
    }
}
