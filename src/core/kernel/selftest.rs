//! Boot-time checks that need the real machine: a running PIT, the speaker
//! gate, the installed heap and a CPU that raises #GP.
//!
//! Built with `--features selftest`; `kernel_main` runs them right after
//! initialisation and prints one line per check.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::console;
use crate::core::interrupts::frame::RegisterFrame;
use crate::core::interrupts::interrupts::{self as dispatch, InterruptHandler};
use crate::core::interrupts::timer;
use crate::devices::drivers::ps2_keyboard::KeyboardPipeline;
use crate::devices::drivers::speaker::{self, Note, Song, SPEAKER};
use crate::devices::input::KeyEvent;
use crate::memory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    pub passed: u32,
    pub failed: u32,
}

impl SelfTestReport {
    fn record(&mut self, name: &str, ok: bool) {
        if ok {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        console::write_fmt(format_args!("[selftest] {:<28} {}\n", name, if ok { "PASS" } else { "FAIL" }));
    }
}

pub fn run() -> SelfTestReport {
    let mut report = SelfTestReport::default();
    report.record("sleep_halt(100) ticks", sleep_is_accurate());
    report.record("shift + a", shifted_letter());
    report.record("ring overflow keeps newest", ring_overflow());
    report.record("heap first fit", heap_reuse());
    report.record("speaker song timing", song_timing());
    report.record("#GP handler resumes", general_protection_recovers());
    console::write_fmt(format_args!(
        "[selftest] {} passed, {} failed\n",
        report.passed, report.failed
    ));
    report
}

fn sleep_is_accurate() -> bool {
    let start = timer::now_ticks();
    timer::sleep_halt(100);
    let elapsed = timer::now_ticks().wrapping_sub(start);
    log::debug!("sleep_halt(100): {} ticks", elapsed);
    (100..=102).contains(&elapsed)
}

fn shifted_letter() -> bool {
    let pipeline: KeyboardPipeline<8> = KeyboardPipeline::new();
    for code in [0x2A, 0x1E, 0xAA, 0x1E] {
        pipeline.handle_scancode(code);
    }
    pipeline.try_pop() == Some(KeyEvent::Char('A'))
        && pipeline.try_pop() == Some(KeyEvent::Char('a'))
        && pipeline.try_pop().is_none()
}

fn ring_overflow() -> bool {
    let pipeline: KeyboardPipeline<64> = KeyboardPipeline::new();
    // 'q' .. 'p' along the top letter row, repeated past capacity.
    let row = [0x10u8, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19];
    for i in 0..70 {
        pipeline.handle_scancode(row[i % row.len()]);
    }
    let mut popped = 0;
    while pipeline.try_pop().is_some() {
        popped += 1;
    }
    popped == 64 && pipeline.events().evicted() == 6
}

fn heap_reuse() -> bool {
    let before = memory::bytes_used();
    let first = memory::alloc(100);
    let second = memory::alloc(200);
    memory::free(first);
    let third = memory::alloc(100);
    let used = memory::bytes_used() - before;

    memory::free(second);
    memory::free(third);
    third == first && used == (104 + 8) + (200 + 8) && memory::bytes_used() == before
}

fn song_timing() -> bool {
    let notes = [Note::new(440, 50), Note::new(880, 50)];
    let start = timer::now_ticks();
    speaker::play_song(&Song::new(&notes));
    let elapsed_ms = (timer::now_ticks() - start) * 1000 / u64::from(timer::TIMER.frequency().max(1));
    elapsed_ms >= 120 && !SPEAKER.lock().is_gated()
}

const GP_VECTOR: u8 = 13;
/// GDT index 511: far past the five real descriptors.
const BAD_SELECTOR: u16 = 0x0FF8;

static GP_ERROR_CODE: AtomicU32 = AtomicU32::new(u32::MAX);

fn skip_faulting_load(frame: &mut RegisterFrame, context: usize) {
    let seen = unsafe { &*(context as *const AtomicU32) };
    seen.store(frame.error_code, Ordering::SeqCst);
    // `mov ds, ax` is 8E D8.
    frame.eip += 2;
}

fn general_protection_recovers() -> bool {
    let previous = dispatch::register_exception(
        GP_VECTOR,
        InterruptHandler::new(skip_faulting_load, &GP_ERROR_CODE as *const AtomicU32 as usize),
    );
    load_bad_data_segment();
    dispatch::set_exception(GP_VECTOR, previous);
    GP_ERROR_CODE.load(Ordering::SeqCst) == u32::from(BAD_SELECTOR)
}

#[cfg(all(target_os = "none", target_arch = "x86"))]
fn load_bad_data_segment() {
    unsafe {
        core::arch::asm!(
            ".byte 0x8e, 0xd8",
            in("eax") u32::from(BAD_SELECTOR),
            options(nostack),
        );
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86")))]
fn load_bad_data_segment() {}
