//! # PS/2 Keyboard Driver
//!
//! Handles PS/2 keyboard input via IRQ1 interrupt.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    IRQ1     ┌──────────────────┐      ┌──────────────┐
//! │  Keyboard   │────────────▶│ ScancodeDecoder  │─────▶│ KeyEventRing │
//! │  (Port 60)  │             │ - E0/E1 prefixes │      │  (64 events) │
//! └─────────────┘             │ - Modifiers      │      └──────┬───────┘
//!                             │ - Keymap         │             │
//!                             └──────────────────┘             ▼
//!                                                   try_pop / pop_blocking
//!                                                         / read_line
//! ```
//!
//! ## Scancode Processing
//!
//! 1. IRQ1 handler reads one byte from port 0x60
//! 2. `ScancodeDecoder` turns it into at most one `KeyEvent`:
//!    - 0xE0 prefix for extended keys (arrows, keypad Enter, right Alt)
//!    - 0xE1 sequences (Pause) are swallowed
//!    - Bit 7 indicates key release; releases never produce events
//!    - Shift and alt-gr track press/release, caps lock toggles on press
//! 3. The event is pushed onto the ring before the handler returns, so it
//!    is visible to the consumer before the EOI is sent
//!
//! ## Usage
//!
//! ```ignore
//! use kcore::devices::drivers::ps2_keyboard;
//!
//! let mut line = [0u8; 128];
//! let n = ps2_keyboard::read_line(&mut line, 128);
//! ```

use spin::Mutex;

use super::keymap::{self, ModifierState};
use crate::config::KEY_RING_CAPACITY;
use crate::core::cpu;
use crate::core::interrupts::interrupts::{self, InterruptHandler};
use crate::core::interrupts::pic::InterruptIndex;
use crate::core::interrupts::RegisterFrame;
use crate::core::io::{Pio, PortIo};
use crate::devices::input::{Direction, KeyEvent, KeyEventRing};

pub const DATA_PORT: u16 = 0x60;
pub const STATUS_PORT: u16 = 0x64;
const STATUS_OUTPUT_FULL: u8 = 0x01;

/// Stale bytes read at most while draining the controller.
const DRAIN_LIMIT: usize = 32;

const PREFIX_EXTENDED: u8 = 0xE0;
const PREFIX_PAUSE: u8 = 0xE1;
/// Bytes following an 0xE1 prefix.
const PAUSE_TAIL: u8 = 2;
const RELEASE_BIT: u8 = 0x80;

const SC_ESCAPE: u8 = 0x01;
const SC_BACKSPACE: u8 = 0x0E;
const SC_TAB: u8 = 0x0F;
const SC_ENTER: u8 = 0x1C;
const SC_LEFT_SHIFT: u8 = 0x2A;
const SC_RIGHT_SHIFT: u8 = 0x36;
const SC_ALT: u8 = 0x38;
const SC_CAPS_LOCK: u8 = 0x3A;
const SC_UP: u8 = 0x48;
const SC_LEFT: u8 = 0x4B;
const SC_RIGHT: u8 = 0x4D;
const SC_DOWN: u8 = 0x50;

pub struct ScancodeDecoder {
    modifiers: ModifierState,
    is_extended: bool,
    pause_bytes_left: u8,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            modifiers: ModifierState::new(),
            is_extended: false,
            pause_bytes_left: 0,
        }
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        if self.pause_bytes_left > 0 {
            self.pause_bytes_left -= 1;
            return None;
        }

        match scancode {
            PREFIX_EXTENDED => {
                self.is_extended = true;
                return None;
            }
            PREFIX_PAUSE => {
                self.pause_bytes_left = PAUSE_TAIL;
                return None;
            }
            _ => {}
        }

        let is_release = scancode & RELEASE_BIT != 0;
        let key_code = scancode & !RELEASE_BIT;

        if core::mem::take(&mut self.is_extended) {
            return self.process_extended(key_code, is_release);
        }

        match key_code {
            SC_LEFT_SHIFT => {
                self.modifiers.left_shift = !is_release;
                return None;
            }
            SC_RIGHT_SHIFT => {
                self.modifiers.right_shift = !is_release;
                return None;
            }
            SC_ALT => {
                self.modifiers.alt_gr = !is_release;
                return None;
            }
            SC_CAPS_LOCK => {
                if !is_release {
                    self.modifiers.caps_lock = !self.modifiers.caps_lock;
                }
                return None;
            }
            _ => {}
        }

        if is_release {
            return None;
        }

        match key_code {
            SC_ENTER => Some(KeyEvent::Enter),
            SC_BACKSPACE => Some(KeyEvent::Backspace),
            SC_TAB => Some(KeyEvent::Tab),
            SC_ESCAPE => Some(KeyEvent::Escape),
            _ => keymap::translate(key_code, &self.modifiers).map(KeyEvent::Char),
        }
    }

    fn process_extended(&mut self, key_code: u8, is_release: bool) -> Option<KeyEvent> {
        // Right Alt is alt-gr.
        if key_code == SC_ALT {
            self.modifiers.alt_gr = !is_release;
            return None;
        }
        if is_release {
            return None;
        }
        match key_code {
            SC_ENTER => Some(KeyEvent::Enter),
            SC_UP => Some(KeyEvent::Arrow(Direction::Up)),
            SC_DOWN => Some(KeyEvent::Arrow(Direction::Down)),
            SC_LEFT => Some(KeyEvent::Arrow(Direction::Left)),
            SC_RIGHT => Some(KeyEvent::Arrow(Direction::Right)),
            // Fake shifts around Print Screen, keypad '/', Home/End...
            _ => None,
        }
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder plus event ring. The decoder is only ever locked from IRQ1 (or
/// from tests standing in for it), so the lock is never contended.
pub struct KeyboardPipeline<const N: usize> {
    decoder: Mutex<ScancodeDecoder>,
    events: KeyEventRing<N>,
}

impl<const N: usize> KeyboardPipeline<N> {
    pub const fn new() -> Self {
        Self {
            decoder: Mutex::new(ScancodeDecoder::new()),
            events: KeyEventRing::new(),
        }
    }

    /// IRQ1 body: decode one byte and enqueue the event, if any.
    pub fn handle_scancode(&self, scancode: u8) {
        if let Some(event) = self.decoder.lock().process_scancode(scancode) {
            if !self.events.push(event) {
                log::trace!("keyboard: ring full, dropped oldest event");
            }
        }
    }

    pub fn events(&self) -> &KeyEventRing<N> {
        &self.events
    }

    pub fn try_pop(&self) -> Option<KeyEvent> {
        self.events.pop()
    }

    pub fn has_pending(&self) -> bool {
        !self.events.is_empty()
    }

    /// Calls `wait` between polls until an event arrives.
    pub fn pop_blocking_with<W: FnMut()>(&self, mut wait: W) -> KeyEvent {
        loop {
            if let Some(event) = self.events.pop() {
                return event;
            }
            wait();
        }
    }
}

impl<const N: usize> Default for KeyboardPipeline<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Line editor over a stream of key events.
///
/// Stores UTF-8 into `buffer`, never more than `max_len` bytes (nor the
/// buffer length). Backspace removes one whole character. Tab inserts a
/// tab, Escape and arrows are ignored. Enter ends the line and is not
/// stored. Returns the number of bytes written.
pub fn read_line_with<N, E>(mut next_event: N, buffer: &mut [u8], max_len: usize, mut echo: E) -> usize
where
    N: FnMut() -> KeyEvent,
    E: FnMut(&str),
{
    let limit = max_len.min(buffer.len());
    let mut len = 0;

    loop {
        let c = match next_event() {
            KeyEvent::Enter => {
                echo("\n");
                return len;
            }
            KeyEvent::Backspace => {
                if len > 0 {
                    len -= 1;
                    while len > 0 && buffer[len] & 0xC0 == 0x80 {
                        len -= 1;
                    }
                    echo("\x08 \x08");
                }
                continue;
            }
            KeyEvent::Tab => '\t',
            KeyEvent::Char(c) => c,
            KeyEvent::Escape | KeyEvent::Arrow(_) => continue,
        };

        let mut utf8 = [0u8; 4];
        let encoded = c.encode_utf8(&mut utf8);
        if len + encoded.len() > limit {
            continue;
        }
        buffer[len..len + encoded.len()].copy_from_slice(encoded.as_bytes());
        len += encoded.len();
        echo(encoded);
    }
}

/// Discards whatever the controller buffered before the handler existed.
/// Returns the number of bytes thrown away.
pub fn drain_output_buffer<P: PortIo>(io: &mut P) -> usize {
    let mut drained = 0;
    while drained < DRAIN_LIMIT && io.read_u8(STATUS_PORT) & STATUS_OUTPUT_FULL != 0 {
        io.read_u8(DATA_PORT);
        drained += 1;
    }
    drained
}

pub static KEYBOARD: KeyboardPipeline<KEY_RING_CAPACITY> = KeyboardPipeline::new();

fn keyboard_interrupt(_frame: &mut RegisterFrame, context: usize) {
    let pipeline = unsafe { &*(context as *const KeyboardPipeline<KEY_RING_CAPACITY>) };
    let scancode = Pio::new().read_u8(DATA_PORT);
    pipeline.handle_scancode(scancode);
}

pub fn init() {
    let drained = drain_output_buffer(&mut Pio::new());
    interrupts::register_irq(
        InterruptIndex::Keyboard.line(),
        InterruptHandler::new(keyboard_interrupt, &KEYBOARD as *const _ as usize),
    );
    interrupts::unmask_irq(InterruptIndex::Keyboard.line());
    log::info!("Keyboard: IRQ1 ready ({} stale bytes drained)", drained);
}

pub fn try_pop() -> Option<KeyEvent> {
    KEYBOARD.try_pop()
}

pub fn has_pending() -> bool {
    KEYBOARD.has_pending()
}

/// Halts between polls. Must not be called from interrupt context.
pub fn pop_blocking() -> KeyEvent {
    KEYBOARD.pop_blocking_with(cpu::enable_and_halt)
}

/// Reads a line from the keyboard, echoing through the console.
pub fn read_line(buffer: &mut [u8], max_len: usize) -> usize {
    read_line_with(pop_blocking, buffer, max_len, crate::console::write_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPorts;

    fn feed(pipeline: &KeyboardPipeline<64>, scancodes: &[u8]) -> Vec<KeyEvent> {
        for &sc in scancodes {
            pipeline.handle_scancode(sc);
        }
        core::iter::from_fn(|| pipeline.try_pop()).collect()
    }

    fn line_from(events: &[KeyEvent], max_len: usize) -> (String, String) {
        let mut events = events.iter().copied();
        let mut buffer = [0u8; 64];
        let mut echoed = String::new();
        let n = read_line_with(
            || events.next().expect("ran out of events"),
            &mut buffer,
            max_len,
            |s| echoed.push_str(s),
        );
        (String::from_utf8(buffer[..n].to_vec()).unwrap(), echoed)
    }

    #[test]
    fn press_release_yields_one_event() {
        let pipeline = KeyboardPipeline::<64>::new();
        assert_eq!(feed(&pipeline, &[0x1E, 0x9E]), vec![KeyEvent::Char('a')]);
    }

    #[test]
    fn shift_applies_only_while_held() {
        let pipeline = KeyboardPipeline::<64>::new();
        assert_eq!(
            feed(&pipeline, &[0x2A, 0x1E, 0xAA, 0x1E]),
            vec![KeyEvent::Char('A'), KeyEvent::Char('a')]
        );
    }

    #[test]
    fn caps_lock_toggles_on_press_only() {
        let pipeline = KeyboardPipeline::<64>::new();
        let events = feed(&pipeline, &[0x3A, 0xBA, 0x1E, 0x2A, 0x1E, 0xAA, 0x3A, 0x1E]);
        assert_eq!(
            events,
            vec![KeyEvent::Char('A'), KeyEvent::Char('a'), KeyEvent::Char('a')]
        );
    }

    #[test]
    fn extended_keys() {
        let pipeline = KeyboardPipeline::<64>::new();
        let events = feed(
            &pipeline,
            &[0xE0, 0x48, 0xE0, 0xC8, 0xE0, 0x4D, 0xE0, 0x1C, 0xE0, 0x2A, 0xE0, 0x35],
        );
        assert_eq!(
            events,
            vec![KeyEvent::Arrow(Direction::Up), KeyEvent::Arrow(Direction::Right), KeyEvent::Enter]
        );
        // The fake shift inside the E0 sequence must not stick.
        assert!(!pipeline.decoder.lock().modifiers().shift());
    }

    #[test]
    fn pause_sequence_is_swallowed() {
        let pipeline = KeyboardPipeline::<64>::new();
        let events = feed(&pipeline, &[0xE1, 0x1D, 0x45, 0xE1, 0x9D, 0xC5, 0x30]);
        assert_eq!(events, vec![KeyEvent::Char('b')]);
    }

    #[test]
    fn right_alt_selects_the_alt_gr_table() {
        let pipeline = KeyboardPipeline::<64>::new();
        let events = feed(&pipeline, &[0xE0, 0x38, 0x12, 0xE0, 0xB8, 0x12]);
        assert_eq!(events, vec![KeyEvent::Char('é'), KeyEvent::Char('e')]);
    }

    #[test]
    fn special_keys() {
        let pipeline = KeyboardPipeline::<64>::new();
        let events = feed(&pipeline, &[0x1C, 0x0E, 0x0F, 0x01, 0x39, 0x3B]);
        assert_eq!(
            events,
            vec![KeyEvent::Enter, KeyEvent::Backspace, KeyEvent::Tab, KeyEvent::Escape, KeyEvent::Char(' ')]
        );
    }

    #[test]
    fn only_mapped_presses_produce_events() {
        let pipeline = KeyboardPipeline::<64>::new();
        // Deterministic pseudo-random byte stream.
        let mut state = 0x1234_5678u32;
        let stream: Vec<u8> = (0..4000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .filter(|&b| b != PREFIX_EXTENDED && b != PREFIX_PAUSE)
            .collect();

        let mut reference = ScancodeDecoder::new();
        let mut expected = 0u32;
        for &sc in &stream {
            let release = sc & RELEASE_BIT != 0;
            let mods_before = reference.modifiers();
            let produced = reference.process_scancode(sc).is_some();
            let code = sc & !RELEASE_BIT;
            let maps = !release
                && match code {
                    SC_ENTER | SC_BACKSPACE | SC_TAB | SC_ESCAPE => true,
                    SC_LEFT_SHIFT | SC_RIGHT_SHIFT | SC_ALT | SC_CAPS_LOCK => false,
                    _ => keymap::translate(code, &mods_before).is_some(),
                };
            assert_eq!(produced, maps, "scancode {:#x}", sc);
            expected += u32::from(maps);
            pipeline.handle_scancode(sc);
            while pipeline.try_pop().is_some() {}
        }
        assert_eq!(pipeline.events().produced(), expected);
    }

    #[test]
    fn full_ring_keeps_newest_events() {
        let pipeline = KeyboardPipeline::<64>::new();
        for _ in 0..70 {
            pipeline.handle_scancode(0x1E);
        }
        pipeline.handle_scancode(0x30);
        assert_eq!(pipeline.events().len(), 64);
        assert_eq!(pipeline.events().evicted(), 7);
        let events: Vec<KeyEvent> = core::iter::from_fn(|| pipeline.try_pop()).collect();
        assert_eq!(events.len(), 64);
        assert_eq!(events.last(), Some(&KeyEvent::Char('b')));
    }

    #[test]
    fn pop_blocking_waits_until_an_event_arrives() {
        let pipeline = KeyboardPipeline::<64>::new();
        let mut waits = 0;
        let event = pipeline.pop_blocking_with(|| {
            waits += 1;
            if waits == 3 {
                pipeline.handle_scancode(0x2C);
            }
        });
        assert_eq!(event, KeyEvent::Char('z'));
        assert_eq!(waits, 3);
    }

    #[test]
    fn read_line_echoes_and_honours_backspace() {
        let events = [
            KeyEvent::Char('h'),
            KeyEvent::Char('x'),
            KeyEvent::Backspace,
            KeyEvent::Char('i'),
            KeyEvent::Arrow(Direction::Left),
            KeyEvent::Escape,
            KeyEvent::Tab,
            KeyEvent::Enter,
        ];
        let (line, echoed) = line_from(&events, 64);
        assert_eq!(line, "hi\t");
        assert_eq!(echoed, "hx\x08 \x08i\t\n");
    }

    #[test]
    fn read_line_never_exceeds_max_len() {
        let events = [
            KeyEvent::Char('a'),
            KeyEvent::Char('b'),
            KeyEvent::Char('c'),
            KeyEvent::Char('d'),
            KeyEvent::Enter,
        ];
        let (line, echoed) = line_from(&events, 3);
        assert_eq!(line, "abc");
        assert_eq!(echoed, "abc\n");
    }

    #[test]
    fn backspace_removes_a_whole_multibyte_character() {
        let events = [
            KeyEvent::Char('a'),
            KeyEvent::Char('é'),
            KeyEvent::Backspace,
            KeyEvent::Backspace,
            KeyEvent::Backspace,
            KeyEvent::Char('€'),
            KeyEvent::Enter,
        ];
        let (line, echoed) = line_from(&events, 64);
        assert_eq!(line, "€");
        assert_eq!(echoed, "aé\x08 \x08\x08 \x08€\n");
    }

    #[test]
    fn multibyte_character_that_does_not_fit_is_refused() {
        let events = [KeyEvent::Char('a'), KeyEvent::Char('€'), KeyEvent::Char('b'), KeyEvent::Enter];
        let (line, _) = line_from(&events, 3);
        assert_eq!(line, "ab");
    }

    #[test]
    fn drain_reads_until_the_output_buffer_is_empty() {
        let mut ports = MockPorts::new();
        ports.script(STATUS_PORT, &[0x01, 0x01, 0x00]);
        ports.script(DATA_PORT, &[0xFA, 0xAA]);
        assert_eq!(drain_output_buffer(&mut ports), 2);
    }

    #[test]
    fn drain_gives_up_on_a_stuck_controller() {
        let mut ports = MockPorts::new();
        ports.set(STATUS_PORT, 0x01);
        assert_eq!(drain_output_buffer(&mut ports), DRAIN_LIMIT);
    }
}
