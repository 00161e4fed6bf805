//! Recording port bus for host tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::core::io::PortIo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read8(u16),
    Write8(u16, u8),
    Read16(u16),
    Write16(u16, u16),
}

#[derive(Default)]
struct Bus {
    log: Vec<Access>,
    scripted: HashMap<u16, VecDeque<u8>>,
    latched: HashMap<u16, u8>,
}

/// Cloneable handle onto one shared bus, so a test can keep a handle while a
/// driver owns another.
///
/// Reads return scripted bytes first, then the last value written to the
/// port, then zero.
#[derive(Clone, Default)]
pub struct MockPorts {
    bus: Rc<RefCell<Bus>>,
}

impl MockPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, port: u16, bytes: &[u8]) {
        self.bus
            .borrow_mut()
            .scripted
            .entry(port)
            .or_default()
            .extend(bytes.iter().copied());
    }

    pub fn set(&self, port: u16, value: u8) {
        self.bus.borrow_mut().latched.insert(port, value);
    }

    pub fn log(&self) -> Vec<Access> {
        self.bus.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.bus.borrow_mut().log.clear();
    }

    /// Bytes written to `port`, in order.
    pub fn writes_to(&self, port: u16) -> Vec<u8> {
        self.bus
            .borrow()
            .log
            .iter()
            .filter_map(|access| match *access {
                Access::Write8(p, v) if p == port => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Every 8-bit write except the 0x80 delay port.
    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.bus
            .borrow()
            .log
            .iter()
            .filter_map(|access| match *access {
                Access::Write8(p, v) if p != 0x80 => Some((p, v)),
                _ => None,
            })
            .collect()
    }

    pub fn current(&self, port: u16) -> u8 {
        self.bus.borrow().latched.get(&port).copied().unwrap_or(0)
    }
}

impl PortIo for MockPorts {
    fn read_u8(&mut self, port: u16) -> u8 {
        let mut bus = self.bus.borrow_mut();
        bus.log.push(Access::Read8(port));
        if let Some(byte) = bus.scripted.get_mut(&port).and_then(VecDeque::pop_front) {
            return byte;
        }
        bus.latched.get(&port).copied().unwrap_or(0)
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        let mut bus = self.bus.borrow_mut();
        bus.log.push(Access::Write8(port, value));
        bus.latched.insert(port, value);
    }

    fn read_u16(&mut self, port: u16) -> u16 {
        let lo = {
            let mut bus = self.bus.borrow_mut();
            bus.log.push(Access::Read16(port));
            bus.scripted.get_mut(&port).and_then(VecDeque::pop_front)
        };
        let hi = self
            .bus
            .borrow_mut()
            .scripted
            .get_mut(&port)
            .and_then(VecDeque::pop_front);
        u16::from_le_bytes([lo.unwrap_or(0), hi.unwrap_or(0)])
    }

    fn write_u16(&mut self, port: u16, value: u16) {
        self.bus.borrow_mut().log.push(Access::Write16(port, value));
    }
}
