use core::fmt;

use spin::Mutex;

use super::status::{InitStatus, StatusTable, INIT_STATUS};
use crate::config::TIMER_HZ;
use crate::core::cpu;
use crate::core::interrupts::{self, gdt, idt, timer};
use crate::devices::drivers::pit::PitError;
use crate::devices::drivers::ps2_keyboard;
use crate::memory::{self, paging, AllocError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    Logger,
    Timer(PitError),
    Heap(AllocError),
    StatusTableFull,
}

impl InitError {
    /// Short reason kept in the status table.
    pub const fn reason(&self) -> &'static str {
        match self {
            InitError::Logger => "logger already installed",
            InitError::Timer(_) => "PIT rejected the tick rate",
            InitError::Heap(AllocError::RegionTooSmall) => "kernel image leaves no room for the heap",
            InitError::Heap(_) => "heap layout invalid",
            InitError::StatusTableFull => "status table full",
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Timer(err) => write!(f, "timer: {}", err),
            InitError::Heap(err) => write!(f, "heap: {}", err),
            other => f.write_str(other.reason()),
        }
    }
}

impl From<PitError> for InitError {
    fn from(err: PitError) -> Self {
        InitError::Timer(err)
    }
}

impl From<AllocError> for InitError {
    fn from(err: AllocError) -> Self {
        InitError::Heap(err)
    }
}

pub const PHASES: [&str; 7] = [
    "Console",
    "Descriptor Tables",
    "Interrupt Controller",
    "Timer",
    "Keyboard",
    "Heap",
    "Paging",
];

/// Brings the kernel core up. `kernel_end` is the first byte past the
/// loaded image. Returns at the first failing phase.
pub fn init_kernel(kernel_end: usize) -> Result<(), InitError> {
    register_phases(&INIT_STATUS)?;
    let status = &INIT_STATUS;

    init_phase(status, 0, || {
        crate::console::init();
        crate::logger::init().map_err(|_| InitError::Logger)
    })?;
    crate::console::write_str("kcore: kernel initialisation\n");

    init_phase(status, 1, || {
        gdt::init();
        idt::init_idt();
        Ok(())
    })?;
    init_phase(status, 2, || {
        interrupts::interrupts::init_pics();
        Ok(())
    })?;
    init_phase(status, 3, || timer::init(TIMER_HZ).map_err(InitError::from))?;
    init_phase(status, 4, || {
        ps2_keyboard::init();
        Ok(())
    })?;

    cpu::enable_interrupts();
    log::info!("Interrupts enabled");

    init_phase(status, 5, || {
        unsafe { memory::init(kernel_end)? };
        Ok(())
    })?;
    init_phase(status, 6, || {
        paging::init();
        Ok(())
    })?;

    crate::console::write_str("kcore: initialisation complete\n");
    Ok(())
}

fn register_phases(status: &Mutex<StatusTable>) -> Result<(), InitError> {
    let mut table = status.lock();
    for name in PHASES {
        if !table.register(name) {
            return Err(InitError::StatusTableFull);
        }
    }
    Ok(())
}

fn init_phase<F>(status: &Mutex<StatusTable>, index: usize, init_fn: F) -> Result<(), InitError>
where
    F: FnOnce() -> Result<(), InitError>,
{
    let name = PHASES[index];
    status.lock().update(name, InitStatus::InProgress);

    match init_fn() {
        Ok(()) => {
            status.lock().update(name, InitStatus::Completed);
            crate::console::write_fmt(format_args!("[{}/{}] {} ok\n", index + 1, PHASES.len(), name));
            Ok(())
        }
        Err(err) => {
            status.lock().update(name, InitStatus::Failed(err.reason()));
            crate::console::write_fmt(format_args!(
                "[{}/{}] {} failed: {}\n",
                index + 1,
                PHASES.len(),
                name,
                err
            ));
            Err(err)
        }
    }
}
