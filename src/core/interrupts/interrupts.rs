//! # Interrupt Dispatch
//!
//! Every trampoline ends up in [`dispatch`] with a [`RegisterFrame`].
//!
//! ## Exceptions (vectors 0-31)
//!
//! | Situation                  | Action                                      |
//! |----------------------------|---------------------------------------------|
//! | Handler registered         | Call it; the frame may be edited            |
//! | No handler                 | Fatal dump: name, vector, error code, frame |
//! | Double fault (#DF, 8)      | Fatal after the handler (if any) returns    |
//!
//! ## Hardware Interrupts (vectors 32-47)
//!
//! | Situation                  | Action                                      |
//! |----------------------------|---------------------------------------------|
//! | Handler registered         | Call it, then EOI                           |
//! | No handler                 | Count it, then EOI                          |
//! | Spurious IRQ7              | Count it, no EOI                            |
//! | Spurious IRQ15             | Count it, EOI to the master only            |
//!
//! EOI goes to the slave first for lines 8-15, then always to the master.
//!
//! ## Locking
//!
//! The handler table lives behind a `spin::Mutex`. Dispatch copies the
//! handler out and drops the lock before calling it, so a handler may fault
//! or register other handlers without deadlocking. Non-interrupt code only
//! takes the lock with interrupts disabled.

use core::fmt;

use spin::Mutex;

use super::frame::RegisterFrame;
use super::pic::{ChainedPics, IRQ_LINES, PIC_1_OFFSET};
use crate::config::UNKNOWN_VECTOR_LOG_LIMIT;
use crate::core::cpu;
use crate::core::io::{Pio, PortIo};
use crate::core::kernel::fatal;

pub const EXCEPTION_VECTORS: u8 = 32;
pub const DOUBLE_FAULT_VECTOR: u8 = 8;
pub const PAGE_FAULT_VECTOR: u8 = 14;
const LAST_IRQ_VECTOR: u32 = PIC_1_OFFSET as u32 + IRQ_LINES as u32 - 1;

const SPURIOUS_MASTER_LINE: u8 = 7;
const SPURIOUS_SLAVE_LINE: u8 = 15;

static EXCEPTION_NAMES: [&str; EXCEPTION_VECTORS as usize] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Hypervisor Injection Exception",
    "VMM Communication Exception",
    "Security Exception",
    "Reserved",
];

pub fn exception_name(vector: u8) -> &'static str {
    EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("Unknown")
}

pub type HandlerFn = fn(&mut RegisterFrame, usize);

/// A handler plus the opaque word it is called with. When the handler
/// belongs to a driver, the context is usually the driver's address.
#[derive(Clone, Copy)]
pub struct InterruptHandler {
    pub func: HandlerFn,
    pub context: usize,
}

impl InterruptHandler {
    pub const fn new(func: HandlerFn, context: usize) -> Self {
        Self { func, context }
    }

    #[inline]
    pub fn invoke(&self, frame: &mut RegisterFrame) {
        (self.func)(frame, self.context)
    }
}

impl fmt::Debug for InterruptHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptHandler")
            .field("func", &(self.func as usize as *const ()))
            .field("context", &self.context)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptError {
    VectorOutOfRange(u8),
    IrqOutOfRange(u8),
}

impl fmt::Display for InterruptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptError::VectorOutOfRange(v) => {
                write!(f, "exception vector {} is outside 0..{}", v, EXCEPTION_VECTORS)
            }
            InterruptError::IrqOutOfRange(line) => {
                write!(f, "IRQ line {} is outside 0..{}", line, IRQ_LINES)
            }
        }
    }
}

/// Exception slots and IRQ slots; `None` means nobody registered.
pub struct HandlerTable {
    exceptions: [Option<InterruptHandler>; EXCEPTION_VECTORS as usize],
    irqs: [Option<InterruptHandler>; IRQ_LINES as usize],
}

impl HandlerTable {
    pub const fn new() -> Self {
        Self {
            exceptions: [None; EXCEPTION_VECTORS as usize],
            irqs: [None; IRQ_LINES as usize],
        }
    }

    pub fn exception(&self, vector: u8) -> Option<InterruptHandler> {
        self.exceptions.get(vector as usize).copied().flatten()
    }

    pub fn irq(&self, line: u8) -> Option<InterruptHandler> {
        self.irqs.get(line as usize).copied().flatten()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptStats {
    pub irq_counts: [u32; IRQ_LINES as usize],
    pub exceptions: u32,
    pub spurious: u32,
    pub unhandled_irqs: u32,
    pub unknown_vectors: u32,
    /// How many unknown vectors made it past the log rate limit.
    pub unknown_logged: u32,
}

pub struct InterruptCore<P: PortIo> {
    handlers: HandlerTable,
    pics: ChainedPics<P>,
    stats: InterruptStats,
}

impl<P: PortIo> InterruptCore<P> {
    pub const fn new(io: P) -> Self {
        Self {
            handlers: HandlerTable::new(),
            pics: ChainedPics::new(io),
            stats: InterruptStats {
                irq_counts: [0; IRQ_LINES as usize],
                exceptions: 0,
                spurious: 0,
                unhandled_irqs: 0,
                unknown_vectors: 0,
                unknown_logged: 0,
            },
        }
    }

    pub fn pics(&mut self) -> &mut ChainedPics<P> {
        &mut self.pics
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn stats(&self) -> InterruptStats {
        self.stats
    }

    /// Replaces the slot for `vector`, returning what was there.
    pub fn set_exception(
        &mut self,
        vector: u8,
        handler: Option<InterruptHandler>,
    ) -> Result<Option<InterruptHandler>, InterruptError> {
        let slot = self
            .handlers
            .exceptions
            .get_mut(vector as usize)
            .ok_or(InterruptError::VectorOutOfRange(vector))?;
        Ok(core::mem::replace(slot, handler))
    }

    pub fn register_exception(
        &mut self,
        vector: u8,
        handler: InterruptHandler,
    ) -> Result<Option<InterruptHandler>, InterruptError> {
        self.set_exception(vector, Some(handler))
    }

    pub fn set_irq(
        &mut self,
        line: u8,
        handler: Option<InterruptHandler>,
    ) -> Result<Option<InterruptHandler>, InterruptError> {
        let slot = self
            .handlers
            .irqs
            .get_mut(line as usize)
            .ok_or(InterruptError::IrqOutOfRange(line))?;
        Ok(core::mem::replace(slot, handler))
    }

    pub fn register_irq(
        &mut self,
        line: u8,
        handler: InterruptHandler,
    ) -> Result<Option<InterruptHandler>, InterruptError> {
        self.set_irq(line, Some(handler))
    }

    pub fn mask_irq(&mut self, line: u8) -> Result<(), InterruptError> {
        if line >= IRQ_LINES {
            return Err(InterruptError::IrqOutOfRange(line));
        }
        self.pics.mask(line);
        Ok(())
    }

    pub fn unmask_irq(&mut self, line: u8) -> Result<(), InterruptError> {
        if line >= IRQ_LINES {
            return Err(InterruptError::IrqOutOfRange(line));
        }
        self.pics.unmask(line);
        Ok(())
    }

    /// Spurious IRQ7/IRQ15 check. Consumes the interrupt (and sends the EOI
    /// the master is owed for IRQ15) when it is spurious.
    fn filter_spurious(&mut self, line: u8) -> bool {
        if line != SPURIOUS_MASTER_LINE && line != SPURIOUS_SLAVE_LINE {
            return false;
        }
        if self.pics.is_in_service(line) {
            return false;
        }
        self.stats.spurious = self.stats.spurious.wrapping_add(1);
        if line == SPURIOUS_SLAVE_LINE {
            self.pics.notify_master_only();
        }
        true
    }

    /// Counts an unassigned vector. Returns the running count when this
    /// one should be logged; the caller logs after dropping the lock.
    fn record_unknown(&mut self) -> Option<u32> {
        self.stats.unknown_vectors = self.stats.unknown_vectors.wrapping_add(1);
        let seen = self.stats.unknown_vectors;
        if seen <= UNKNOWN_VECTOR_LOG_LIMIT || seen.is_power_of_two() {
            self.stats.unknown_logged = self.stats.unknown_logged.wrapping_add(1);
            return Some(seen);
        }
        None
    }
}

/// Routes one interrupt. Called by `interrupt_dispatch` on hardware and
/// directly by tests.
pub fn dispatch<P: PortIo>(core: &Mutex<InterruptCore<P>>, frame: &mut RegisterFrame) {
    match frame.vector {
        v if v < EXCEPTION_VECTORS as u32 => dispatch_exception(core, frame, v as u8),
        v if v <= LAST_IRQ_VECTOR => dispatch_irq(core, frame, (v - PIC_1_OFFSET as u32) as u8),
        v => {
            let logged = core.lock().record_unknown();
            if let Some(seen) = logged {
                log::warn!("ignoring interrupt on unassigned vector {} ({} so far)", v, seen);
            }
        }
    }
}

fn dispatch_exception<P: PortIo>(core: &Mutex<InterruptCore<P>>, frame: &mut RegisterFrame, vector: u8) {
    let handler = {
        let mut core = core.lock();
        core.stats.exceptions = core.stats.exceptions.wrapping_add(1);
        core.handlers.exception(vector)
    };

    match handler {
        Some(handler) => {
            handler.invoke(frame);
            if vector == DOUBLE_FAULT_VECTOR {
                fatal_exception(frame, vector);
            }
        }
        None => fatal_exception(frame, vector),
    }
}

fn dispatch_irq<P: PortIo>(core: &Mutex<InterruptCore<P>>, frame: &mut RegisterFrame, line: u8) {
    let handler = {
        let mut core = core.lock();
        if core.filter_spurious(line) {
            return;
        }
        let count = &mut core.stats.irq_counts[line as usize];
        *count = count.wrapping_add(1);
        core.handlers.irq(line)
    };

    match handler {
        Some(handler) => handler.invoke(frame),
        None => {
            let mut core = core.lock();
            core.stats.unhandled_irqs = core.stats.unhandled_irqs.wrapping_add(1);
        }
    }

    core.lock().pics.notify_end_of_interrupt(line);
}

fn fatal_exception(frame: &RegisterFrame, vector: u8) -> ! {
    if vector == PAGE_FAULT_VECTOR {
        fatal::halt_fmt(format_args!(
            "EXCEPTION: {} (vector {}, error code {:#x}, cr2 {:#010x})\n{}",
            exception_name(vector),
            vector,
            frame.error_code,
            cpu::read_cr2(),
            frame
        ))
    }
    fatal::halt_fmt(format_args!(
        "EXCEPTION: {} (vector {}, error code {:#x})\n{}",
        exception_name(vector),
        vector,
        frame.error_code,
        frame
    ))
}

pub static INTERRUPTS: Mutex<InterruptCore<Pio>> = Mutex::new(InterruptCore::new(Pio::new()));

/// Trampoline target. `frame` points at the registers the stub pushed.
#[cfg(all(target_os = "none", target_arch = "x86"))]
#[no_mangle]
extern "C" fn interrupt_dispatch(frame: *mut RegisterFrame) {
    let frame = unsafe { &mut *frame };
    dispatch(&INTERRUPTS, frame);
}

pub fn init_pics() {
    cpu::without_interrupts(|| INTERRUPTS.lock().pics().initialize());
    log::debug!("PIC remapped to vectors {}..{}", PIC_1_OFFSET, LAST_IRQ_VECTOR);
}

/// Installs an exception handler and returns the previous one. An
/// out-of-range vector is a programming error and halts.
pub fn register_exception(vector: u8, handler: InterruptHandler) -> Option<InterruptHandler> {
    set_exception(vector, Some(handler))
}

pub fn set_exception(vector: u8, handler: Option<InterruptHandler>) -> Option<InterruptHandler> {
    match cpu::without_interrupts(|| INTERRUPTS.lock().set_exception(vector, handler)) {
        Ok(previous) => previous,
        Err(err) => fatal::halt_fmt(format_args!("register_exception: {}", err)),
    }
}

pub fn register_irq(line: u8, handler: InterruptHandler) -> Option<InterruptHandler> {
    set_irq(line, Some(handler))
}

pub fn set_irq(line: u8, handler: Option<InterruptHandler>) -> Option<InterruptHandler> {
    match cpu::without_interrupts(|| INTERRUPTS.lock().set_irq(line, handler)) {
        Ok(previous) => previous,
        Err(err) => fatal::halt_fmt(format_args!("register_irq: {}", err)),
    }
}

pub fn unmask_irq(line: u8) {
    if let Err(err) = cpu::without_interrupts(|| INTERRUPTS.lock().unmask_irq(line)) {
        fatal::halt_fmt(format_args!("unmask_irq: {}", err));
    }
}

pub fn mask_irq(line: u8) {
    if let Err(err) = cpu::without_interrupts(|| INTERRUPTS.lock().mask_irq(line)) {
        fatal::halt_fmt(format_args!("mask_irq: {}", err));
    }
}

pub fn stats() -> InterruptStats {
    cpu::without_interrupts(|| INTERRUPTS.lock().stats())
}
