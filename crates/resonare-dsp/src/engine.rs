//! Polyphonic engine: voice pool, sample-accurate MIDI queue and the output bus.
//!
//! Hosts queue `MidiEvent`s with an in-block sample offset, hand over a new
//! `EngineParams` snapshot whenever something changed, and call
//! `process_block` once per audio callback. Nothing on that path allocates:
//! voices, the event queue, delay lines and lookup tables are all sized in
//! `Engine::new` / `prepare`.

use std::path::Path;

use num_traits::AsPrimitive;

use crate::comb::Comb;
use crate::denormal::DenormalGuard;
use crate::error::Error;
use crate::limiter::Limiter;
use crate::mallet::MalletKind;
use crate::params::{Coupling, EngineParams};
use crate::sampler::SampleData;
use crate::tables::{db_to_gain, semitones_to_ratio};
use crate::voice::{SharedTables, Voice, VoiceOutput};

pub const MAX_POLYPHONY: usize = 16;
/// Events beyond this many pending are dropped.
pub const MIDI_QUEUE_CAPACITY: usize = 1024;
/// Pitch-wheel glide time.
pub const BEND_GLIDE_MS: f64 = 10.0;

// ── Tuning ──────────────────────────────────────────────────────────────────

/// Note-to-frequency mapping.
pub trait Tuning: Send {
    fn note_to_freq(&self, note: u8) -> f64;
}

/// 12-TET around a reference A4.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EqualTemperament {
    pub a4: f64,
}

impl Default for EqualTemperament {
    fn default() -> Self {
        Self { a4: 440.0 }
    }
}

impl Tuning for EqualTemperament {
    fn note_to_freq(&self, note: u8) -> f64 {
        self.a4 * semitones_to_ratio(note as f64 - 69.0)
    }
}

// ── MIDI ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEventKind {
    /// Velocity 0 is treated as a note-off.
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    SustainPedalOn,
    SustainPedalOff,
    /// 14-bit wheel position, centre 8192.
    PitchWheel(u16),
    /// Silences every voice at once.
    AllNotesOff,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    /// Samples from the start of the next processed block.
    pub offset: i64,
    pub kind: MidiEventKind,
}

impl MidiEvent {
    pub fn new(offset: usize, kind: MidiEventKind) -> Self {
        Self {
            offset: offset as i64,
            kind,
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine {
    sample_rate: f64,
    params: EngineParams,
    /// Snapshot the voices were last configured from.
    applied: Option<EngineParams>,
    dirty: bool,

    tables: SharedTables,
    voices: Vec<Voice>,
    clock: u64,

    queue: Vec<MidiEvent>,
    sustain: bool,
    sustained: [bool; 128],

    bend: f64,
    bend_target: f64,
    bend_step: f64,
    glide_len: u32,
    /// Samples left in the current glide; `None` once voices hold the target.
    glide: Option<u32>,

    comb: Comb,
    limiter: Limiter,
    tuning: Box<dyn Tuning>,
}

impl Engine {
    pub fn new(sample_rate: f64, params: EngineParams) -> Result<Self, Error> {
        let tables = SharedTables::new(sample_rate, params.a.ratio, params.b.ratio)?;
        let mut engine = Self {
            sample_rate,
            params,
            applied: None,
            dirty: true,
            tables,
            voices: Vec::new(),
            clock: 0,
            queue: Vec::with_capacity(MIDI_QUEUE_CAPACITY),
            sustain: false,
            sustained: [false; 128],
            bend: 1.0,
            bend_target: 1.0,
            bend_step: 0.0,
            glide_len: 1,
            glide: None,
            comb: Comb::new(sample_rate),
            limiter: Limiter::new(sample_rate, &params.limiter),
            tuning: Box::new(EqualTemperament::default()),
        };
        engine.allocate(sample_rate);
        Ok(engine)
    }

    /// Resize everything for a new sample rate. Allocates; call off the audio thread.
    pub fn prepare(&mut self, sample_rate: f64) -> Result<(), Error> {
        let mut tables = SharedTables::new(sample_rate, self.params.a.ratio, self.params.b.ratio)?;
        tables.sampler = self.tables.sampler.clone();
        self.tables = tables;
        self.allocate(sample_rate);
        Ok(())
    }

    fn allocate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.voices = (0..MAX_POLYPHONY)
            .map(|i| Voice::new(sample_rate, (i as u32 + 1).wrapping_mul(2654435761)))
            .collect();
        self.comb = Comb::new(sample_rate);
        self.limiter = Limiter::new(sample_rate, &self.params.limiter);
        self.glide_len = ((BEND_GLIDE_MS * 0.001 * sample_rate) as u32).max(1);
        self.glide = None;
        self.bend = 1.0;
        self.bend_target = 1.0;
        self.queue.clear();
        self.sustain = false;
        self.sustained = [false; 128];
        self.applied = None;
        self.dirty = true;
        log::debug!("prepared {MAX_POLYPHONY} voices at {sample_rate} Hz");
    }

    /// Store a new snapshot; voices pick it up at the next block.
    pub fn set_params(&mut self, params: &EngineParams) {
        self.params = *params;
        self.dirty = true;
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn set_tuning(&mut self, tuning: Box<dyn Tuning>) {
        self.tuning = tuning;
    }

    /// Decode a WAV file for the user-file mallet. Off the audio thread only.
    pub fn load_user_sample(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let result = self.tables.sampler.load_user_file(path);
        self.dirty = true;
        result
    }

    pub fn set_user_sample(&mut self, sample: SampleData) {
        self.tables.sampler.set_user_sample(sample);
        self.dirty = true;
    }

    /// Queue an event for the next block. Returns `false` if the queue is full.
    pub fn push_event(&mut self, event: MidiEvent) -> bool {
        if self.queue.len() >= MIDI_QUEUE_CAPACITY {
            return false;
        }
        self.queue.push(event);
        true
    }

    /// Silence every voice immediately.
    pub fn clear_voices(&mut self) {
        for voice in &mut self.voices {
            voice.clear();
        }
    }

    pub fn reset(&mut self) {
        self.clear_voices();
        self.queue.clear();
        self.sustain = false;
        self.sustained = [false; 128];
        self.comb.clear();
        self.limiter.reset();
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn pitch_bend(&self) -> f64 {
        self.bend
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices[..self.polyphony()]
    }

    /// Voices that can still produce sound.
    pub fn active_voices(&self) -> usize {
        self.voices().iter().filter(|v| v.is_sounding()).count()
    }

    fn polyphony(&self) -> usize {
        self.params.polyphony.clamp(1, MAX_POLYPHONY)
    }

    /// Re-derive every cached coefficient from the stored snapshot.
    fn apply_params(&mut self) {
        self.dirty = false;
        let p = self.params;

        let structural = self.applied.is_none_or(|prev| {
            prev.a.model != p.a.model
                || prev.b.model != p.b.model
                || prev.a.partials != p.a.partials
                || prev.b.partials != p.b.partials
                || prev.mallet.kind != p.mallet.kind
        });
        if structural {
            self.clear_voices();
        }

        self.tables.models.a.set_aspect(p.a.ratio);
        self.tables.models.b.set_aspect(p.b.ratio);
        match p.mallet.kind {
            MalletKind::Internal(sample) => self.tables.sampler.select_builtin(sample),
            MalletKind::UserFile => self.tables.sampler.select_user(),
            MalletKind::Impulse => {}
        }

        if self.applied.is_none_or(|prev| prev.limiter != p.limiter) {
            self.limiter = Limiter::new(self.sample_rate, &p.limiter);
        }

        let polyphony = self.polyphony();
        for voice in &mut self.voices[polyphony..] {
            voice.clear();
        }
        for voice in &mut self.voices {
            voice.configure(&p);
            voice.update_resonators(&self.tables);
        }
        self.applied = Some(p);
    }

    // ── Voice allocation ────────────────────────────────────────────────────

    /// Voice for a new note: same note if reuse is on, else the idle voice
    /// released longest ago, else the voice pressed longest ago.
    fn pick_voice(&self, note: u8) -> usize {
        let voices = self.voices();
        if self.params.reuse_voices {
            if let Some(i) = voices.iter().position(|v| v.note() == note) {
                return i;
            }
        }
        let mut pick = 0;
        for (i, v) in voices.iter().enumerate().skip(1) {
            let best = &voices[pick];
            let better = match (v.is_pressed(), best.is_pressed()) {
                (false, false) => v.release_ts() < best.release_ts(),
                (true, true) => v.pressed_ts() < best.pressed_ts(),
                (false, true) => true,
                (true, false) => false,
            };
            if better {
                pick = i;
            }
        }
        pick
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        let idx = self.pick_voice(note);
        self.clock += 1;
        let freq = self.tuning.note_to_freq(note);
        let vel = velocity.min(127) as f64 / 127.0;
        self.voices[idx].trigger(note, freq, vel, self.clock, &self.params, &self.tables);
    }

    fn note_off(&mut self, note: u8) {
        self.clock += 1;
        let polyphony = self.polyphony();
        for voice in &mut self.voices[..polyphony] {
            if voice.note() == note && !voice.is_release() {
                voice.release(self.clock, &self.tables);
            }
        }
    }

    fn handle_event(&mut self, kind: MidiEventKind) {
        match kind {
            MidiEventKind::NoteOn { note, velocity: 0 } | MidiEventKind::NoteOff { note } => {
                let slot = usize::from(note.min(127));
                if self.sustain {
                    self.sustained[slot] = true;
                } else {
                    self.note_off(note);
                }
            }
            MidiEventKind::NoteOn { note, velocity } => {
                self.note_on(note, velocity);
                // A re-struck note is held again, not by the pedal
                self.sustained[usize::from(note.min(127))] = false;
            }
            MidiEventKind::SustainPedalOn => self.sustain = true,
            MidiEventKind::SustainPedalOff => {
                self.sustain = false;
                for note in 0..128u8 {
                    if std::mem::take(&mut self.sustained[usize::from(note)]) {
                        self.note_off(note);
                    }
                }
            }
            MidiEventKind::PitchWheel(value) => self.set_bend_target(value),
            MidiEventKind::AllNotesOff => {
                self.clear_voices();
                self.sustained = [false; 128];
            }
        }
    }

    // ── Pitch bend ──────────────────────────────────────────────────────────

    fn set_bend_target(&mut self, wheel: u16) {
        let normalized = (wheel.min(16383) as f64 - 8192.0) / 8191.0;
        self.bend_target = semitones_to_ratio(normalized * self.params.bend_range);
        self.bend_step = (self.bend_target - self.bend) / self.glide_len as f64;
        self.glide = Some(self.glide_len);
    }

    /// One glide step, pushed into every voice until the target is reached.
    fn advance_glide(&mut self) {
        let Some(remaining) = self.glide else {
            return;
        };
        let remaining = if remaining > 0 {
            self.bend += self.bend_step;
            if remaining == 1 {
                self.bend = self.bend_target;
            }
            remaining - 1
        } else {
            0
        };
        let polyphony = self.polyphony();
        for voice in &mut self.voices[..polyphony] {
            voice.apply_pitch_bend(self.bend, &self.tables);
        }
        self.glide = if remaining == 0 { None } else { Some(remaining) };
    }

    // ── Processing ──────────────────────────────────────────────────────────

    fn dispatch_due_events(&mut self) {
        for i in 0..self.queue.len() {
            let event = self.queue[i];
            if event.offset == 0 {
                self.handle_event(event.kind);
            }
            self.queue[i].offset -= 1;
        }
    }

    /// Render one block. `input` is an optional mono excitation signal.
    /// Renders `min(left.len(), right.len())` frames.
    pub fn process_block<S>(&mut self, input: Option<&[S]>, left: &mut [S], right: &mut [S])
    where
        S: AsPrimitive<f64>,
        f64: AsPrimitive<S>,
    {
        let _guard = DenormalGuard::new();

        self.queue.retain(|e| e.offset >= 0);
        if self.dirty {
            self.apply_params();
        }

        let gain = db_to_gain(self.params.gain_db);
        let polyphony = self.polyphony();
        let frames = left.len().min(right.len());

        for n in 0..frames {
            self.advance_glide();
            self.dispatch_due_events();

            let audio_in = input.and_then(|buf| buf.get(n)).map_or(0.0, |s| s.as_());

            let mut sum = VoiceOutput::default();
            for voice in &mut self.voices[..polyphony] {
                let out = voice.process(&self.params, &self.tables, audio_in);
                sum.direct += out.direct;
                sum.a += out.a;
                sum.b += out.b;
            }

            let p = &self.params;
            let resonant = if p.a.on && p.b.on {
                match p.coupling {
                    Coupling::Serial => sum.b,
                    Coupling::Parallel => sum.a * (1.0 - p.ab_mix) + sum.b * p.ab_mix,
                }
            } else {
                sum.a + sum.b
            };
            let total = sum.direct + resonant * gain;

            let (l, r) = if p.stereoizer {
                self.comb.process(total)
            } else {
                (total, total)
            };
            let (l, r) = self.limiter.process(l, r);
            left[n] = l.as_();
            right[n] = r.as_();
        }
    }
}
