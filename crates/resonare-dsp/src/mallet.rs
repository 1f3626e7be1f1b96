/// Mallet exciter: a decaying impulse through a bandpass, or one-shot sample playback.
///
/// Impulse: the bandpass sits at the (velocity-tracked) stiffness frequency and
/// is fed an exponentially decaying unit impulse for 100 ms.
/// Sample: the selected `Sampler` waveform is read with cubic interpolation at
/// `source_rate / sample_rate * pitch * keytrack`, then through the optional
/// bipolar post-filter.

use crate::error::Error;
use crate::filters::Biquad;
use crate::sampler::{InternalSample, Sampler};
use crate::tables::{cut_to_freq, semitones_to_ratio, KEYTRACK_REFERENCE_NOTE};

/// Impulse excitation window in seconds.
const IMPULSE_WINDOW: f64 = 0.1;
/// Impulse decay rate: `exp(-IMPULSE_DECAY / sample_rate)` per sample.
const IMPULSE_DECAY: f64 = 100.0;
const IMPULSE_GAIN: f64 = 2.0;
const FILTER_Q: f64 = 0.707;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalletKind {
    #[default]
    Impulse,
    UserFile,
    Internal(InternalSample),
}

impl MalletKind {
    /// Number of host menu entries: impulse, user file, then the built-in bank.
    pub const COUNT: usize = 2 + InternalSample::ALL.len();

    pub fn uses_sample(self) -> bool {
        !matches!(self, MalletKind::Impulse)
    }
}

impl TryFrom<usize> for MalletKind {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self, Error> {
        match index {
            0 => Ok(MalletKind::Impulse),
            1 => Ok(MalletKind::UserFile),
            i => InternalSample::ALL
                .get(i - 2)
                .map(|&s| MalletKind::Internal(s))
                .ok_or(Error::UnknownMallet(i)),
        }
    }
}

/// Parameters for one strike.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Strike {
    pub kind: MalletKind,
    /// Impulse bandpass frequency in Hz.
    pub freq: f64,
    pub note: u8,
    /// Sample pitch offset in semitones.
    pub pitch: f64,
    /// Key tracking amount, 0..1.
    pub keytrack: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mallet {
    sample_rate: f64,
    kind: MalletKind,
    impulse: f64,
    impulse_decay: f64,
    countdown: u32,
    impulse_filter: Biquad,
    playback: f64,
    playback_end: f64,
    playback_speed: f64,
    sample_filter: Biquad,
    filter_enabled: bool,
}

impl Mallet {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            kind: MalletKind::Impulse,
            impulse: 0.0,
            impulse_decay: (-IMPULSE_DECAY / sample_rate).exp(),
            countdown: 0,
            impulse_filter: Biquad::default(),
            playback: f64::INFINITY,
            playback_end: 0.0,
            playback_speed: 1.0,
            sample_filter: Biquad::default(),
            filter_enabled: false,
        }
    }

    /// Start a strike. For sample kinds the waveform rate comes from `sampler`.
    pub fn trigger(&mut self, strike: &Strike, sampler: &Sampler) {
        self.kind = strike.kind;
        match strike.kind {
            MalletKind::Impulse => {
                self.impulse_filter = Biquad::bandpass(strike.freq, FILTER_Q, self.sample_rate);
                self.countdown = (self.sample_rate * IMPULSE_WINDOW) as u32;
                self.impulse = 1.0;
                self.impulse_decay = (-IMPULSE_DECAY / self.sample_rate).exp();
            }
            MalletKind::UserFile | MalletKind::Internal(_) => {
                let data = sampler.current();
                let source_rate = data.sample_rate();
                let keytrack = semitones_to_ratio(
                    (strike.note as f64 - KEYTRACK_REFERENCE_NOTE) * strike.keytrack.clamp(0.0, 1.0),
                );
                self.playback_speed =
                    source_rate / self.sample_rate * semitones_to_ratio(strike.pitch) * keytrack;
                self.playback = 0.0;
                self.playback_end = data.len() as f64;
            }
        }
    }

    /// Bipolar post-filter for sample playback: <0 lowpass, >0 highpass, 0 bypass.
    pub fn set_filter(&mut self, norm: f64) {
        let norm = norm.clamp(-1.0, 1.0);
        self.filter_enabled = norm != 0.0;
        let freq = cut_to_freq(norm);
        if norm < 0.0 {
            self.sample_filter.set_lowpass(freq, FILTER_Q, self.sample_rate);
        } else if norm > 0.0 {
            self.sample_filter.set_highpass(freq, FILTER_Q, self.sample_rate);
        }
    }

    #[inline]
    pub fn process(&mut self, sampler: &Sampler) -> f64 {
        match self.kind {
            MalletKind::Impulse => {
                if self.countdown == 0 {
                    return 0.0;
                }
                self.countdown -= 1;
                let y = self.impulse_filter.process(self.impulse) * IMPULSE_GAIN;
                self.impulse *= self.impulse_decay;
                y
            }
            MalletKind::UserFile | MalletKind::Internal(_) => {
                let data = sampler.current();
                if self.playback >= data.len() as f64 {
                    return 0.0;
                }
                let mut y = data.cubic(self.playback);
                self.playback += self.playback_speed;
                if self.filter_enabled {
                    y = self.sample_filter.process(y);
                }
                y
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.countdown > 0 || self.playback < self.playback_end
    }

    pub fn clear(&mut self) {
        self.countdown = 0;
        self.impulse = 0.0;
        self.playback = f64::INFINITY;
        self.impulse_filter.clear(0.0);
        self.sample_filter.clear(0.0);
    }
}
