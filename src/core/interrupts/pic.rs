//! # Programmable Interrupt Controller (8259 PIC)
//!
//! Configures the legacy 8259 PIC chips for interrupt routing.
//!
//! ## PIC Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │◀────│  (Slave)    │
//! │ IRQ 0-7     │IRQ2 │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! ## Vector Remapping
//!
//! By default, IRQ 0-15 conflict with CPU exception vectors.
//! We remap them:
//! - PIC 1: vectors 32-39 (IRQ 0-7)
//! - PIC 2: vectors 40-47 (IRQ 8-15)
//!
//! ## Interrupt Assignments
//!
//! | IRQ | Vector | Device            |
//! |-----|--------|-------------------|
//! | 0   | 32     | Timer             |
//! | 1   | 33     | Keyboard          |
//! | 2   | 34     | Cascade to slave  |
//!
//! Every other line starts masked.

use crate::core::io::PortIo;

pub const PIC_1_OFFSET: u8 = 32; // Primary PIC handles IRQs 0-7
pub const PIC_2_OFFSET: u8 = 40; // Secondary PIC handles IRQs 8-15

pub const PIC_1_COMMAND: u16 = 0x20;
pub const PIC_1_DATA: u16 = 0x21;
pub const PIC_2_COMMAND: u16 = 0xA0;
pub const PIC_2_DATA: u16 = 0xA1;

pub const IRQ_LINES: u8 = 16;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;
const OCW3_READ_ISR: u8 = 0x0B;
const CMD_END_OF_INTERRUPT: u8 = 0x20;

/// Slave is wired to master input 2.
const CASCADE_LINE: u8 = 2;

/// Timer, keyboard and cascade open; everything else masked.
pub const INITIAL_MASTER_MASK: u8 = !((1 << 0) | (1 << 1) | (1 << CASCADE_LINE));
pub const INITIAL_SLAVE_MASK: u8 = 0xFF;

// Interrupt indices - these are the actual vector numbers the CPU sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,        // 32 - IRQ0
    Keyboard = PIC_1_OFFSET + 1, // 33 - IRQ1
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn line(self) -> u8 {
        self.as_u8() - PIC_1_OFFSET
    }
}

/// The master/slave 8259 pair.
pub struct ChainedPics<P: PortIo> {
    io: P,
}

impl<P: PortIo> ChainedPics<P> {
    pub const fn new(io: P) -> Self {
        Self { io }
    }

    /// Remaps the pair to `PIC_1_OFFSET`/`PIC_2_OFFSET`, wires the cascade,
    /// selects 8086 mode and applies the initial masks.
    pub fn initialize(&mut self) {
        let io = &mut self.io;

        // ICW1: start initialisation, expect ICW4
        io.write_u8(PIC_1_COMMAND, ICW1_INIT | ICW1_ICW4);
        io.io_wait();
        io.write_u8(PIC_2_COMMAND, ICW1_INIT | ICW1_ICW4);
        io.io_wait();

        // ICW2: vector offsets
        io.write_u8(PIC_1_DATA, PIC_1_OFFSET);
        io.io_wait();
        io.write_u8(PIC_2_DATA, PIC_2_OFFSET);
        io.io_wait();

        // ICW3: master gets a bitmask of slave inputs, slave gets its id
        io.write_u8(PIC_1_DATA, 1 << CASCADE_LINE);
        io.io_wait();
        io.write_u8(PIC_2_DATA, CASCADE_LINE);
        io.io_wait();

        // ICW4
        io.write_u8(PIC_1_DATA, ICW4_8086);
        io.io_wait();
        io.write_u8(PIC_2_DATA, ICW4_8086);
        io.io_wait();

        self.set_masks(INITIAL_MASTER_MASK, INITIAL_SLAVE_MASK);
    }

    pub fn masks(&mut self) -> (u8, u8) {
        (self.io.read_u8(PIC_1_DATA), self.io.read_u8(PIC_2_DATA))
    }

    pub fn set_masks(&mut self, master: u8, slave: u8) {
        self.io.write_u8(PIC_1_DATA, master);
        self.io.write_u8(PIC_2_DATA, slave);
    }

    /// Lines past 15 are ignored.
    pub fn mask(&mut self, line: u8) {
        if let Some((port, bit)) = Self::mask_bit(line) {
            let mask = self.io.read_u8(port);
            self.io.write_u8(port, mask | bit);
        }
    }

    /// Lines past 15 are ignored.
    pub fn unmask(&mut self, line: u8) {
        if let Some((port, bit)) = Self::mask_bit(line) {
            let mask = self.io.read_u8(port);
            self.io.write_u8(port, mask & !bit);
        }
    }

    fn mask_bit(line: u8) -> Option<(u16, u8)> {
        match line {
            0..=7 => Some((PIC_1_DATA, 1 << line)),
            8..=15 => Some((PIC_2_DATA, 1 << (line - 8))),
            _ => None,
        }
    }

    /// In-service registers, slave in the high byte.
    pub fn read_isr(&mut self) -> u16 {
        self.io.write_u8(PIC_1_COMMAND, OCW3_READ_ISR);
        self.io.write_u8(PIC_2_COMMAND, OCW3_READ_ISR);
        let master = self.io.read_u8(PIC_1_COMMAND);
        let slave = self.io.read_u8(PIC_2_COMMAND);
        u16::from_le_bytes([master, slave])
    }

    pub fn is_in_service(&mut self, line: u8) -> bool {
        self.read_isr() & (1 << line) != 0
    }

    /// Slave first for lines 8..15, then always the master.
    pub fn notify_end_of_interrupt(&mut self, line: u8) {
        if line >= 8 {
            self.io.write_u8(PIC_2_COMMAND, CMD_END_OF_INTERRUPT);
        }
        self.io.write_u8(PIC_1_COMMAND, CMD_END_OF_INTERRUPT);
    }

    /// EOI for a spurious IRQ15: the master did see IRQ2.
    pub fn notify_master_only(&mut self) {
        self.io.write_u8(PIC_1_COMMAND, CMD_END_OF_INTERRUPT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPorts;

    #[test]
    fn initialize_remaps_and_masks() {
        let ports = MockPorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        pics.initialize();

        assert_eq!(ports.writes_to(PIC_1_COMMAND), vec![0x11]);
        assert_eq!(ports.writes_to(PIC_2_COMMAND), vec![0x11]);
        assert_eq!(ports.writes_to(PIC_1_DATA), vec![0x20, 0x04, 0x01, 0xF8]);
        assert_eq!(ports.writes_to(PIC_2_DATA), vec![0x28, 0x02, 0x01, 0xFF]);
    }

    #[test]
    fn eoi_goes_to_slave_first_for_high_lines() {
        let ports = MockPorts::new();
        let mut pics = ChainedPics::new(ports.clone());

        pics.notify_end_of_interrupt(1);
        assert_eq!(ports.writes(), vec![(PIC_1_COMMAND, 0x20)]);

        ports.clear_log();
        pics.notify_end_of_interrupt(12);
        assert_eq!(ports.writes(), vec![(PIC_2_COMMAND, 0x20), (PIC_1_COMMAND, 0x20)]);
    }

    #[test]
    fn unmask_clears_only_the_line_bit() {
        let ports = MockPorts::new();
        let mut pics = ChainedPics::new(ports.clone());
        pics.set_masks(0xFF, 0xFF);

        pics.unmask(1);
        pics.unmask(12);
        assert_eq!(pics.masks(), (0xFD, 0xEF));

        pics.mask(1);
        assert_eq!(pics.masks(), (0xFF, 0xEF));
    }

    #[test]
    fn out_of_range_lines_touch_no_port() {
        let ports = MockPorts::new();
        let mut pics = ChainedPics::new(ports.clone());

        pics.unmask(16);
        pics.mask(255);
        assert!(ports.log().is_empty());
    }

    #[test]
    fn isr_read_combines_both_chips() {
        let ports = MockPorts::new();
        ports.script(PIC_1_COMMAND, &[0x80]);
        ports.script(PIC_2_COMMAND, &[0x80]);
        let mut pics = ChainedPics::new(ports.clone());

        assert_eq!(pics.read_isr(), 0x8080);
        assert_eq!(ports.writes(), vec![(PIC_1_COMMAND, 0x0B), (PIC_2_COMMAND, 0x0B)]);
    }

    #[test]
    fn interrupt_index_lines() {
        assert_eq!(InterruptIndex::Timer.line(), 0);
        assert_eq!(InterruptIndex::Keyboard.as_u8(), 33);
    }
}
