//! CPU control primitives.
//!
//! On hosted builds these are no-ops so that code paths which mask
//! interrupts or halt can run inside unit tests.

#[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
use core::arch::asm;

const EFLAGS_IF: usize = 1 << 9;

#[inline]
pub fn enable_interrupts() {
    #[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe {
        asm!("sti", options(nostack));
    }
}

#[inline]
pub fn disable_interrupts() {
    #[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe {
        asm!("cli", options(nostack));
    }
}

#[inline]
pub fn halt() {
    #[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe {
        asm!("hlt", options(nostack));
    }
}

/// `sti; hlt` back to back, so an interrupt arriving between the two cannot
/// be missed.
#[inline]
pub fn enable_and_halt() {
    #[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe {
        asm!("sti", "hlt", options(nostack));
    }
}

#[inline]
fn read_flags() -> usize {
    #[cfg(all(target_os = "none", target_arch = "x86"))]
    {
        let flags: usize;
        unsafe {
            asm!("pushfd", "pop {}", out(reg) flags, options(nomem, preserves_flags));
        }
        flags
    }
    #[cfg(all(target_os = "none", target_arch = "x86_64"))]
    {
        let flags: usize;
        unsafe {
            asm!("pushfq", "pop {}", out(reg) flags, options(nomem, preserves_flags));
        }
        flags
    }
    #[cfg(not(target_os = "none"))]
    {
        0
    }
}

/// Faulting linear address of the last page fault.
#[inline]
pub fn read_cr2() -> usize {
    #[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
    {
        let value: usize;
        unsafe {
            asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }
    #[cfg(not(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64"))))]
    {
        0
    }
}

pub fn interrupts_enabled() -> bool {
    read_flags() & EFLAGS_IF != 0
}

/// Runs `f` with interrupts masked, restoring the previous state afterwards.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let were_enabled = interrupts_enabled();
    if were_enabled {
        disable_interrupts();
    }
    let result = f();
    if were_enabled {
        enable_interrupts();
    }
    result
}

pub fn halt_forever() -> ! {
    loop {
        disable_interrupts();
        halt();
    }
}
