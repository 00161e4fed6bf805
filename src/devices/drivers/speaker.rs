//! # PC Speaker
//!
//! The speaker is driven by PIT channel 2 in square-wave mode and gated by
//! the two low bits of port 0x61:
//!
//! | Bit | Meaning                           |
//! |-----|-----------------------------------|
//! | 0   | PIT channel 2 gate                |
//! | 1   | speaker data enable               |
//!
//! Channel 0 (the system tick) is never touched here, and neither are the
//! PIC masks, so playing a song does not disturb the timer or the keyboard.
//!
//! ## Usage
//!
//! ```ignore
//! use kcore::devices::drivers::speaker::{self, Note, Song};
//!
//! const JINGLE: [Note; 3] = [Note::new(440, 50), Note::rest(20), Note::new(880, 50)];
//! speaker::play_song(&Song::new(&JINGLE));
//! ```

use spin::Mutex;

use super::pit::{Pit, PitChannel, PitError, PitMode};
use crate::config::{INTER_NOTE_GAP_MS, PLAYBACK_SLICE_MS};
use crate::core::io::{Pio, PortIo};

pub const SPEAKER_GATE_PORT: u16 = 0x61;
const GATE_BITS: u8 = 0b11;

/// Something that can wait for a number of milliseconds.
pub trait Sleep {
    fn sleep_ms(&self, ms: u32);
}

/// A frequency of zero is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

impl Note {
    pub const fn new(frequency_hz: u32, duration_ms: u32) -> Self {
        Self { frequency_hz, duration_ms }
    }

    pub const fn rest(duration_ms: u32) -> Self {
        Self::new(0, duration_ms)
    }

    pub const fn is_rest(&self) -> bool {
        self.frequency_hz == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Song<'a> {
    pub notes: &'a [Note],
}

impl<'a> Song<'a> {
    pub const fn new(notes: &'a [Note]) -> Self {
        Self { notes }
    }

    pub const fn len(&self) -> usize {
        self.notes.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Playing time including the gap after every note.
    pub fn duration_ms(&self) -> u64 {
        self.notes
            .iter()
            .map(|note| note.duration_ms as u64 + INTER_NOTE_GAP_MS as u64)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Completed,
    Cancelled,
}

pub struct Speaker<P: PortIo> {
    pit: Pit<P>,
}

impl<P: PortIo> Speaker<P> {
    pub const fn new(io: P) -> Self {
        Self { pit: Pit::new(io) }
    }

    /// Starts a tone, or stops the speaker when `frequency_hz` is zero.
    pub fn start_tone(&mut self, frequency_hz: u32) -> Result<(), PitError> {
        if frequency_hz == 0 {
            self.stop_tone();
            return Ok(());
        }

        self.pit
            .set_frequency(PitChannel::Channel2, PitMode::SquareWave, frequency_hz)?;

        let io = self.pit.io();
        let gate = io.read_u8(SPEAKER_GATE_PORT);
        if gate & GATE_BITS != GATE_BITS {
            io.write_u8(SPEAKER_GATE_PORT, gate | GATE_BITS);
        }
        Ok(())
    }

    pub fn stop_tone(&mut self) {
        let io = self.pit.io();
        let gate = io.read_u8(SPEAKER_GATE_PORT);
        io.write_u8(SPEAKER_GATE_PORT, gate & !GATE_BITS);
    }

    pub fn is_gated(&mut self) -> bool {
        self.pit.io().read_u8(SPEAKER_GATE_PORT) & GATE_BITS == GATE_BITS
    }

    fn sound(&mut self, note: &Note) {
        if let Err(err) = self.start_tone(note.frequency_hz) {
            log::warn!("speaker: {}, resting instead", err);
            self.stop_tone();
        }
    }

    pub fn play_song<S: Sleep + ?Sized>(&mut self, song: &Song<'_>, sleeper: &S) {
        for note in song.notes {
            self.sound(note);
            sleeper.sleep_ms(note.duration_ms);
            self.stop_tone();
            sleeper.sleep_ms(INTER_NOTE_GAP_MS);
        }
    }

    /// Like `play_song`, but waits in `PLAYBACK_SLICE_MS` slices and stops
    /// as soon as `cancel` returns true. The speaker is silent on return.
    pub fn play_song_until<S, C>(&mut self, song: &Song<'_>, sleeper: &S, mut cancel: C) -> Playback
    where
        S: Sleep + ?Sized,
        C: FnMut() -> bool,
    {
        for note in song.notes {
            self.sound(note);
            let played = sleep_sliced(sleeper, note.duration_ms, &mut cancel);
            self.stop_tone();
            if !played || !sleep_sliced(sleeper, INTER_NOTE_GAP_MS, &mut cancel) {
                return Playback::Cancelled;
            }
        }
        Playback::Completed
    }
}

/// False if `cancel` fired before `ms` elapsed.
fn sleep_sliced<S, C>(sleeper: &S, ms: u32, cancel: &mut C) -> bool
where
    S: Sleep + ?Sized,
    C: FnMut() -> bool,
{
    let mut left = ms;
    while left > 0 {
        if cancel() {
            return false;
        }
        let slice = left.min(PLAYBACK_SLICE_MS);
        sleeper.sleep_ms(slice);
        left -= slice;
    }
    true
}

pub static SPEAKER: Mutex<Speaker<Pio>> = Mutex::new(Speaker::new(Pio::new()));

pub fn beep(frequency_hz: u32, duration_ms: u32) {
    let mut speaker = SPEAKER.lock();
    speaker.sound(&Note::new(frequency_hz, duration_ms));
    crate::core::interrupts::timer::sleep_halt(duration_ms);
    speaker.stop_tone();
}

pub fn play_song(song: &Song<'_>) {
    SPEAKER.lock().play_song(song, &crate::core::interrupts::timer::TIMER);
}

/// Plays `song` until it ends or a key event is waiting.
pub fn play_song_cancellable(song: &Song<'_>) -> Playback {
    let playback = SPEAKER.lock().play_song_until(
        song,
        &crate::core::interrupts::timer::TIMER,
        super::ps2_keyboard::has_pending,
    );
    if playback == Playback::Cancelled {
        log::debug!("speaker: playback cancelled by key press");
    }
    playback
}
