//! Native-range parameter snapshot consumed by the engine.
//!
//! Hosts keep their own parameter storage and hand the engine a fresh
//! `EngineParams` whenever anything changed. Defaults are the instrument's
//! factory settings.

use crate::envelope::EnvelopeShape;
use crate::limiter::LimiterSettings;
use crate::mallet::MalletKind;
use crate::models::Model;
use crate::noise::FilterMode;

/// Choices offered for the partial count, in host menu order.
pub const PARTIAL_CHOICES: [usize; 7] = [4, 8, 16, 32, 64, 1, 2];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MalletParams {
    pub kind: MalletKind,
    /// Dry mallet level on the direct bus, 0..1.
    pub mix: f64,
    /// Mallet level into the resonators, 0..1.
    pub res: f64,
    /// Impulse bandpass frequency in Hz, 100..5000.
    pub stiffness: f64,
    /// Sample playback offset in semitones.
    pub pitch: f64,
    /// Sample post-filter, bipolar -1..1 (0 bypasses).
    pub filter: f64,
    /// Sample key tracking amount, 0..1.
    pub keytrack: f64,
    pub vel_mix: f64,
    pub vel_res: f64,
    pub vel_stiffness: f64,
}

impl Default for MalletParams {
    fn default() -> Self {
        Self {
            kind: MalletKind::Impulse,
            mix: 0.0,
            res: 0.8,
            stiffness: 600.0,
            pitch: 0.0,
            filter: 0.0,
            keytrack: 0.0,
            vel_mix: 0.0,
            vel_res: 0.0,
            vel_stiffness: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseParams {
    /// Source crossfade: 0 = white noise, 1 = resonator sine oscillators.
    pub osc: f64,
    pub mix: f64,
    pub res: f64,
    pub filter_mode: FilterMode,
    pub filter_freq: f64,
    pub filter_q: f64,
    pub envelope: EnvelopeShape,
    pub vel_mix: f64,
    pub vel_res: f64,
    pub vel_freq: f64,
    pub vel_q: f64,
    pub vel_attack: f64,
    pub vel_decay: f64,
    pub vel_sustain: f64,
    pub vel_release: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            osc: 0.0,
            mix: 0.0,
            res: 0.0,
            filter_mode: FilterMode::Highpass,
            filter_freq: 20.0,
            filter_q: 0.707,
            envelope: EnvelopeShape {
                attack_ms: 1.0,
                decay_ms: 500.0,
                sustain: 0.0,
                release_ms: 500.0,
                attack_tension: 0.4,
                decay_tension: 0.4,
                release_tension: 0.4,
            },
            vel_mix: 0.0,
            vel_res: 0.0,
            vel_freq: 0.0,
            vel_q: 0.0,
            vel_attack: 0.0,
            vel_decay: 0.0,
            vel_sustain: 0.0,
            vel_release: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResonatorParams {
    pub on: bool,
    pub model: Model,
    /// Active partial count, 1..=64.
    pub partials: usize,
    /// Decay time in seconds, 0.01..100.
    pub decay: f64,
    /// Frequency-dependent damping ("material"), -1..1.
    pub damp: f64,
    /// Frequency-dependent brightness, -1..1.
    pub tone: f64,
    /// Strike position along the body, 0.02..0.5.
    pub hit: f64,
    /// Decay multiplier applied while released, 0.001..1.
    pub release: f64,
    /// Inharmonic stretch, 0.0001..1.
    pub inharm: f64,
    /// Aspect ratio for Beam, Membrane, Plate and Djembe.
    pub ratio: f64,
    /// Output filter, bipolar -1..1 (0 bypasses).
    pub cut: f64,
    /// Waveguide wall damping, 0..1 (1 is no damping).
    pub radius: f64,
    /// Pitch offset in semitones.
    pub coarse: f64,
    /// Pitch offset in cents.
    pub fine: f64,
    pub vel_decay: f64,
    pub vel_hit: f64,
    pub vel_inharm: f64,
    pub vel_damp: f64,
    pub vel_tone: f64,
}

impl ResonatorParams {
    /// Frequency multiplier from the coarse and fine offsets.
    pub fn pitch_factor(&self) -> f64 {
        crate::tables::semitones_to_ratio(self.coarse + self.fine / 100.0)
    }
}

impl Default for ResonatorParams {
    fn default() -> Self {
        Self {
            on: true,
            model: Model::String,
            partials: 32,
            decay: 1.0,
            damp: 0.0,
            tone: 0.0,
            hit: 0.26,
            release: 1.0,
            inharm: 0.0001,
            ratio: 1.0,
            cut: 0.0,
            radius: 0.5,
            coarse: 0.0,
            fine: 0.0,
            vel_decay: 0.0,
            vel_hit: 0.0,
            vel_inharm: 0.0,
            vel_damp: 0.0,
            vel_tone: 0.0,
        }
    }
}

/// How resonator B receives its input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Coupling {
    /// Both resonators hear the exciters; outputs are crossfaded by `ab_mix`.
    #[default]
    Parallel,
    /// A feeds B, B is the output, and close modes are split apart.
    Serial,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineParams {
    pub mallet: MalletParams,
    pub noise: NoiseParams,
    pub a: ResonatorParams,
    pub b: ResonatorParams,
    pub coupling: Coupling,
    /// Parallel crossfade from A (0) to B (1).
    pub ab_mix: f64,
    /// Serial mode-splitting amount, 0..1. Voices scale it to coupling strength.
    pub ab_split: f64,
    /// Resonator bus gain in dB.
    pub gain_db: f64,
    /// Pitch wheel range in semitones.
    pub bend_range: f64,
    pub stereoizer: bool,
    /// Retrigger a voice already holding the same note instead of allocating.
    pub reuse_voices: bool,
    pub polyphony: usize,
    /// Output limiter on the summed bus.
    pub limiter: LimiterSettings,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            mallet: MalletParams::default(),
            noise: NoiseParams::default(),
            a: ResonatorParams::default(),
            b: ResonatorParams {
                on: false,
                ..ResonatorParams::default()
            },
            coupling: Coupling::Parallel,
            ab_mix: 0.5,
            ab_split: 0.01,
            gain_db: 0.0,
            bend_range: 2.0,
            stereoizer: true,
            reuse_voices: false,
            polyphony: 8,
            limiter: LimiterSettings::default(),
        }
    }
}
