//! Mono one-shot samples for the mallet exciter.
//!
//! A `Sampler` owns the built-in bank (rendered procedurally once, at
//! construction) and an optional user sample decoded with `hound`. The
//! mallet only ever borrows the selected waveform, so switching samples on
//! the audio thread is an index change.

use std::f64::consts::PI;
use std::path::Path;

use crate::error::{Error, SampleError};
use crate::filters::Biquad;
use crate::lookup::catmull_rom;

/// Rate the built-in bank is rendered at.
pub const BUILTIN_SAMPLE_RATE: f64 = 48000.0;
/// Longest sample kept after loading, in seconds.
pub const MAX_SAMPLE_SECONDS: f64 = 3.0;

/// Decoded mono waveform, peak-normalized to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleData {
    waveform: Vec<f64>,
    sample_rate: f64,
}

impl SampleData {
    /// Build from interleaved frames: mix to mono, truncate, normalize.
    pub fn from_interleaved(
        samples: &[f64],
        channels: usize,
        sample_rate: f64,
    ) -> Result<Self, SampleError> {
        let channels = channels.max(1);
        let max_frames = (MAX_SAMPLE_SECONDS * sample_rate) as usize;
        let mut waveform: Vec<f64> = samples
            .chunks_exact(channels)
            .take(max_frames)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64)
            .collect();
        if waveform.is_empty() {
            return Err(SampleError::Empty);
        }
        let peak = waveform.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        if peak <= 1e-12 {
            return Err(SampleError::Silent);
        }
        for s in &mut waveform {
            *s /= peak;
        }
        Ok(Self { waveform, sample_rate })
    }

    /// Decode a WAV file (integer or float PCM, any channel count).
    pub fn load_wav(path: impl AsRef<Path>) -> Result<Self, SampleError> {
        let path = path.as_ref();
        let decode = |source| SampleError::Decode {
            path: path.to_path_buf(),
            source,
        };
        let reader = hound::WavReader::open(path).map_err(decode)?;
        let spec = reader.spec();
        let samples: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<Result<_, _>>()
                .map_err(decode)?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f64;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f64 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(decode)?
            }
        };
        Self::from_interleaved(&samples, spec.channels as usize, spec.sample_rate as f64)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.waveform.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveform.is_empty()
    }

    /// Catmull-Rom read at a fractional frame position, wrapping at the ends.
    #[inline]
    pub fn cubic(&self, pos: f64) -> f64 {
        let n = self.waveform.len();
        if n == 0 {
            return 0.0;
        }
        let i = pos.floor();
        let t = pos - i;
        let i = i as i64;
        let at = |k: i64| self.waveform[k.rem_euclid(n as i64) as usize];
        catmull_rom(at(i - 1), at(i), at(i + 1), at(i + 2), t)
    }

    pub fn waveform(&self) -> &[f64] {
        &self.waveform
    }
}

/// Built-in mallet samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InternalSample {
    #[default]
    Click,
    Tick,
    Knock,
    Wood,
    Metal,
    Felt,
}

impl InternalSample {
    pub const ALL: [InternalSample; 6] = [
        InternalSample::Click,
        InternalSample::Tick,
        InternalSample::Knock,
        InternalSample::Wood,
        InternalSample::Metal,
        InternalSample::Felt,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            InternalSample::Click => "Click",
            InternalSample::Tick => "Tick",
            InternalSample::Knock => "Knock",
            InternalSample::Wood => "Wood",
            InternalSample::Metal => "Metal",
            InternalSample::Felt => "Felt",
        }
    }

    /// Render this one-shot at [`BUILTIN_SAMPLE_RATE`].
    fn render(self) -> SampleData {
        let sr = BUILTIN_SAMPLE_RATE;
        let mut rng = 0x9E37_79B9u32.wrapping_add(self.index() as u32);
        let mut noise = move || {
            rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
            (rng as i32 as f64) / (i32::MAX as f64)
        };

        let raw = match self {
            InternalSample::Click => {
                let mut bp = Biquad::bandpass(3500.0, 0.9, sr);
                decaying(sr, 0.02, 0.0015, |_| bp.process(noise()))
            }
            InternalSample::Tick => {
                decaying(sr, 0.015, 0.002, |t| (2.0 * PI * 5200.0 * t).sin())
            }
            InternalSample::Knock => decaying(sr, 0.12, 0.02, |t| {
                // Falling pitch, 420 Hz towards 180 Hz
                let f = 180.0 + 240.0 * (-t / 0.01).exp();
                (2.0 * PI * f * t).sin()
            }),
            InternalSample::Wood => {
                let mut lo = Biquad::bandpass(900.0, 8.0, sr);
                let mut hi = Biquad::bandpass(2470.0, 10.0, sr);
                decaying(sr, 0.08, 0.012, |_| {
                    let n = noise();
                    lo.process(n) + 0.6 * hi.process(n)
                })
            }
            InternalSample::Metal => decaying(sr, 0.4, 0.09, |t| {
                [(1.0, 1.0), (2.76, 0.6), (5.40, 0.35), (8.93, 0.2)]
                    .iter()
                    .map(|&(ratio, amp)| amp * (2.0 * PI * 820.0 * ratio * t).sin())
                    .sum()
            }),
            InternalSample::Felt => {
                let mut lp = Biquad::lowpass(700.0, 0.707, sr);
                decaying(sr, 0.06, 0.008, |_| lp.process(noise()))
            }
        };

        SampleData::from_interleaved(&raw, 1, sr).unwrap_or_else(|_| SampleData {
            waveform: vec![1.0],
            sample_rate: sr,
        })
    }
}

/// `len_s` seconds of `f(t)` under an exponential decay with time constant `tau_s`.
fn decaying(sr: f64, len_s: f64, tau_s: f64, mut f: impl FnMut(f64) -> f64) -> Vec<f64> {
    let n = (len_s * sr) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / sr;
            f(t) * (-t / tau_s).exp()
        })
        .collect()
}

/// Which waveform the mallet plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Builtin(InternalSample),
    User,
}

#[derive(Clone, Debug)]
pub struct Sampler {
    bank: Vec<SampleData>,
    user: Option<SampleData>,
    source: Source,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            bank: InternalSample::ALL.iter().map(|s| s.render()).collect(),
            user: None,
            source: Source::Builtin(InternalSample::default()),
        }
    }

    pub fn select_builtin(&mut self, sample: InternalSample) {
        self.source = Source::Builtin(sample);
    }

    /// Play the user sample if one is loaded, else the default built-in.
    pub fn select_user(&mut self) {
        self.source = match self.user {
            Some(_) => Source::User,
            None => Source::Builtin(InternalSample::default()),
        };
    }

    /// Install an already decoded user sample and select it.
    pub fn set_user_sample(&mut self, sample: SampleData) {
        self.user = Some(sample);
        self.source = Source::User;
    }

    /// Decode `path` and select it. On failure the default built-in sample is
    /// selected and the error is returned for the caller to report.
    pub fn load_user_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        match SampleData::load_wav(path.as_ref()) {
            Ok(sample) => {
                log::debug!(
                    "loaded user sample {} ({} frames at {} Hz)",
                    path.as_ref().display(),
                    sample.len(),
                    sample.sample_rate()
                );
                self.set_user_sample(sample);
                Ok(())
            }
            Err(e) => {
                log::warn!("{e}; falling back to the {} sample", InternalSample::default().name());
                self.user = None;
                self.source = Source::Builtin(InternalSample::default());
                Err(e.into())
            }
        }
    }

    pub fn has_user_sample(&self) -> bool {
        self.user.is_some()
    }

    /// The currently selected waveform.
    pub fn current(&self) -> &SampleData {
        match (self.source, &self.user) {
            (Source::User, Some(user)) => user,
            (Source::Builtin(s), _) => &self.bank[s.index()],
            (Source::User, None) => &self.bank[InternalSample::default().index()],
        }
    }
}
