use nih_plug::prelude::*;
use resonare_dsp::envelope::EnvelopeShape;
use resonare_dsp::limiter::LimiterSettings;
use resonare_dsp::mallet::MalletKind;
use resonare_dsp::models::Model;
use resonare_dsp::noise::FilterMode;
use resonare_dsp::params::{
    Coupling, EngineParams, MalletParams, NoiseParams, PARTIAL_CHOICES, ResonatorParams,
};
use resonare_dsp::sampler::InternalSample;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Callback that flags the engine snapshot as stale.
fn mark_dirty<T: 'static>(flag: &Arc<AtomicBool>) -> Arc<dyn Fn(T) + Send + Sync> {
    let flag = flag.clone();
    Arc::new(move |_: T| flag.store(true, Ordering::Release))
}

fn percent(name: impl Into<String>, default: f32, dirty: &Arc<AtomicBool>) -> FloatParam {
    FloatParam::new(name, default, FloatRange::Linear { min: 0.0, max: 1.0 })
        .with_unit(" %")
        .with_value_to_string(formatters::v2s_f32_percentage(0))
        .with_string_to_value(formatters::s2v_f32_percentage())
        .with_callback(mark_dirty(dirty))
}

/// Bipolar -1..1 control shown as a signed percentage.
fn bipolar(name: impl Into<String>, default: f32, dirty: &Arc<AtomicBool>) -> FloatParam {
    FloatParam::new(name, default, FloatRange::Linear { min: -1.0, max: 1.0 })
        .with_unit(" %")
        .with_value_to_string(formatters::v2s_f32_percentage(0))
        .with_string_to_value(formatters::s2v_f32_percentage())
        .with_callback(mark_dirty(dirty))
}

fn stage_ms(name: impl Into<String>, default: f32, dirty: &Arc<AtomicBool>) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Skewed {
            min: 1.0,
            max: 5000.0,
            factor: FloatRange::skew_factor(-2.0),
        },
    )
    .with_unit(" ms")
    .with_step_size(0.1)
    .with_callback(mark_dirty(dirty))
}

/// Menu backed by a list of names, stored as an index.
fn choice(
    name: impl Into<String>,
    default: usize,
    names: &'static [&'static str],
    dirty: &Arc<AtomicBool>,
) -> IntParam {
    IntParam::new(
        name,
        default as i32,
        IntRange::Linear {
            min: 0,
            max: names.len() as i32 - 1,
        },
    )
    .with_value_to_string(Arc::new(move |i: i32| {
        names.get(i as usize).copied().unwrap_or("?").to_string()
    }))
    .with_string_to_value(Arc::new(move |s: &str| {
        names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(s.trim()))
            .map(|i| i as i32)
    }))
    .with_callback(mark_dirty(dirty))
}

const MODEL_NAMES: [&str; Model::COUNT] = [
    "String",
    "Beam",
    "Squared",
    "Membrane",
    "Plate",
    "Drumhead",
    "Marimba",
    "Open Tube",
    "Closed Tube",
    "Marimba2",
    "Bell",
    "Djembe",
];

const MALLET_NAMES: [&str; MalletKind::COUNT] = [
    "Impulse", "User File", "Click", "Tick", "Knock", "Wood", "Metal", "Felt",
];

const PARTIAL_NAMES: [&str; PARTIAL_CHOICES.len()] = ["4", "8", "16", "32", "64", "1", "2"];

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseFilter {
    #[name = "Lowpass"]
    Lowpass,
    #[name = "Bandpass"]
    Bandpass,
    #[name = "Highpass"]
    Highpass,
}

impl From<NoiseFilter> for FilterMode {
    fn from(f: NoiseFilter) -> Self {
        match f {
            NoiseFilter::Lowpass => FilterMode::Lowpass,
            NoiseFilter::Bandpass => FilterMode::Bandpass,
            NoiseFilter::Highpass => FilterMode::Highpass,
        }
    }
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Couple {
    #[name = "Parallel"]
    Parallel,
    #[name = "Serial"]
    Serial,
}

impl From<Couple> for Coupling {
    fn from(c: Couple) -> Self {
        match c {
            Couple::Parallel => Coupling::Parallel,
            Couple::Serial => Coupling::Serial,
        }
    }
}

// ── Resonator ───────────────────────────────────────────────────────────────

#[derive(Params)]
pub struct ResonatorGroup {
    #[id = "on"]
    pub on: BoolParam,
    #[id = "model"]
    pub model: IntParam,
    #[id = "partials"]
    pub partials: IntParam,

    /// Decay time of the fundamental in seconds.
    #[id = "decay"]
    pub decay: FloatParam,
    /// Frequency-dependent damping ("material").
    #[id = "damp"]
    pub damp: FloatParam,
    #[id = "tone"]
    pub tone: FloatParam,
    /// Strike position along the body.
    #[id = "hit"]
    pub hit: FloatParam,
    /// Decay multiplier once the key is up.
    #[id = "rel"]
    pub release: FloatParam,
    #[id = "inharm"]
    pub inharm: FloatParam,
    /// Aspect ratio for Beam, Membrane, Plate and Djembe.
    #[id = "ratio"]
    pub ratio: FloatParam,
    #[id = "cut"]
    pub cut: FloatParam,
    /// Tube wall damping (1 = none).
    #[id = "radius"]
    pub radius: FloatParam,
    #[id = "coarse"]
    pub coarse: FloatParam,
    #[id = "fine"]
    pub fine: FloatParam,

    #[id = "vel_decay"]
    pub vel_decay: FloatParam,
    #[id = "vel_hit"]
    pub vel_hit: FloatParam,
    #[id = "vel_inharm"]
    pub vel_inharm: FloatParam,
    #[id = "vel_damp"]
    pub vel_damp: FloatParam,
    #[id = "vel_tone"]
    pub vel_tone: FloatParam,
}

impl ResonatorGroup {
    fn new(label: &str, on: bool, dirty: &Arc<AtomicBool>) -> Self {
        let d = ResonatorParams::default();
        let default_partials = PARTIAL_CHOICES
            .iter()
            .position(|&n| n == d.partials)
            .unwrap_or(0);
        Self {
            on: BoolParam::new(format!("{label} On"), on).with_callback(mark_dirty(dirty)),
            model: choice(format!("{label} Model"), d.model.index(), &MODEL_NAMES, dirty),
            partials: choice(
                format!("{label} Partials"),
                default_partials,
                &PARTIAL_NAMES,
                dirty,
            ),

            decay: FloatParam::new(
                format!("{label} Decay"),
                d.decay as f32,
                FloatRange::Skewed {
                    min: 0.01,
                    max: 100.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" s")
            .with_value_to_string(formatters::v2s_f32_rounded(2))
            .with_callback(mark_dirty(dirty)),
            damp: bipolar(format!("{label} Material"), d.damp as f32, dirty),
            tone: bipolar(format!("{label} Tone"), d.tone as f32, dirty),
            hit: FloatParam::new(
                format!("{label} Hit"),
                d.hit as f32,
                FloatRange::Linear {
                    min: 0.02,
                    max: 0.5,
                },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(2))
            .with_callback(mark_dirty(dirty)),
            release: FloatParam::new(
                format!("{label} Release"),
                d.release as f32,
                FloatRange::Skewed {
                    min: 0.001,
                    max: 1.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(3))
            .with_callback(mark_dirty(dirty)),
            inharm: FloatParam::new(
                format!("{label} Inharmonic"),
                d.inharm as f32,
                FloatRange::Skewed {
                    min: 0.0001,
                    max: 1.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(4))
            .with_callback(mark_dirty(dirty)),
            ratio: FloatParam::new(
                format!("{label} Ratio"),
                d.ratio as f32,
                FloatRange::Skewed {
                    min: 0.1,
                    max: 10.0,
                    factor: FloatRange::skew_factor(-1.5),
                },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(2))
            .with_callback(mark_dirty(dirty)),
            cut: bipolar(format!("{label} Cut"), d.cut as f32, dirty),
            radius: percent(format!("{label} Radius"), d.radius as f32, dirty),
            coarse: FloatParam::new(
                format!("{label} Coarse"),
                d.coarse as f32,
                FloatRange::Linear {
                    min: -48.0,
                    max: 48.0,
                },
            )
            .with_unit(" st")
            .with_step_size(1.0)
            .with_callback(mark_dirty(dirty)),
            fine: FloatParam::new(
                format!("{label} Fine"),
                d.fine as f32,
                FloatRange::Linear {
                    min: -100.0,
                    max: 100.0,
                },
            )
            .with_unit(" ct")
            .with_step_size(1.0)
            .with_callback(mark_dirty(dirty)),

            vel_decay: bipolar(format!("{label} Vel Decay"), 0.0, dirty),
            vel_hit: bipolar(format!("{label} Vel Hit"), 0.0, dirty),
            vel_inharm: bipolar(format!("{label} Vel Inharmonic"), 0.0, dirty),
            vel_damp: bipolar(format!("{label} Vel Material"), 0.0, dirty),
            vel_tone: bipolar(format!("{label} Vel Tone"), 0.0, dirty),
        }
    }

    fn snapshot(&self) -> ResonatorParams {
        let model = Model::try_from(self.model.value() as usize).unwrap_or_default();
        let partials = PARTIAL_CHOICES
            .get(self.partials.value() as usize)
            .copied()
            .unwrap_or(PARTIAL_CHOICES[0]);
        ResonatorParams {
            on: self.on.value(),
            model,
            partials,
            decay: self.decay.value() as f64,
            damp: self.damp.value() as f64,
            tone: self.tone.value() as f64,
            hit: self.hit.value() as f64,
            release: self.release.value() as f64,
            inharm: self.inharm.value() as f64,
            ratio: self.ratio.value() as f64,
            cut: self.cut.value() as f64,
            radius: self.radius.value() as f64,
            coarse: self.coarse.value() as f64,
            fine: self.fine.value() as f64,
            vel_decay: self.vel_decay.value() as f64,
            vel_hit: self.vel_hit.value() as f64,
            vel_inharm: self.vel_inharm.value() as f64,
            vel_damp: self.vel_damp.value() as f64,
            vel_tone: self.vel_tone.value() as f64,
        }
    }
}

// ── Plugin parameters ───────────────────────────────────────────────────────

#[derive(Params)]
pub struct ResonareParams {
    /// Set by every parameter callback; the audio thread swaps it once per block.
    pub dirty: Arc<AtomicBool>,

    /// Path of the user-file mallet sample, reloaded on initialize.
    #[persist = "user-sample"]
    pub user_sample: RwLock<String>,

    // Mallet
    #[id = "mallet_type"]
    pub mallet_type: IntParam,
    #[id = "mallet_mix"]
    pub mallet_mix: FloatParam,
    #[id = "mallet_res"]
    pub mallet_res: FloatParam,
    #[id = "mallet_stiff"]
    pub mallet_stiffness: FloatParam,
    #[id = "mallet_pitch"]
    pub mallet_pitch: FloatParam,
    #[id = "mallet_filter"]
    pub mallet_filter: FloatParam,
    #[id = "mallet_ktrack"]
    pub mallet_keytrack: FloatParam,
    #[id = "vel_mallet_mix"]
    pub vel_mallet_mix: FloatParam,
    #[id = "vel_mallet_res"]
    pub vel_mallet_res: FloatParam,
    #[id = "vel_mallet_stiff"]
    pub vel_mallet_stiffness: FloatParam,

    // Noise
    #[id = "noise_osc"]
    pub noise_osc: FloatParam,
    #[id = "noise_mix"]
    pub noise_mix: FloatParam,
    #[id = "noise_res"]
    pub noise_res: FloatParam,
    #[id = "noise_fmode"]
    pub noise_filter_mode: EnumParam<NoiseFilter>,
    #[id = "noise_ffreq"]
    pub noise_filter_freq: FloatParam,
    #[id = "noise_fq"]
    pub noise_filter_q: FloatParam,
    #[id = "noise_att"]
    pub noise_attack: FloatParam,
    #[id = "noise_dec"]
    pub noise_decay: FloatParam,
    #[id = "noise_sus"]
    pub noise_sustain: FloatParam,
    #[id = "noise_rel"]
    pub noise_release: FloatParam,
    #[id = "noise_att_ten"]
    pub noise_attack_tension: FloatParam,
    #[id = "noise_dec_ten"]
    pub noise_decay_tension: FloatParam,
    #[id = "noise_rel_ten"]
    pub noise_release_tension: FloatParam,
    #[id = "vel_noise_mix"]
    pub vel_noise_mix: FloatParam,
    #[id = "vel_noise_res"]
    pub vel_noise_res: FloatParam,
    #[id = "vel_noise_freq"]
    pub vel_noise_freq: FloatParam,
    #[id = "vel_noise_q"]
    pub vel_noise_q: FloatParam,
    #[id = "vel_noise_att"]
    pub vel_noise_attack: FloatParam,
    #[id = "vel_noise_dec"]
    pub vel_noise_decay: FloatParam,
    #[id = "vel_noise_sus"]
    pub vel_noise_sustain: FloatParam,
    #[id = "vel_noise_rel"]
    pub vel_noise_release: FloatParam,

    #[nested(id_prefix = "a", group = "Resonator A")]
    pub a: ResonatorGroup,
    #[nested(id_prefix = "b", group = "Resonator B")]
    pub b: ResonatorGroup,

    // Bus
    #[id = "couple"]
    pub coupling: EnumParam<Couple>,
    #[id = "ab_mix"]
    pub ab_mix: FloatParam,
    #[id = "ab_split"]
    pub ab_split: FloatParam,
    #[id = "gain"]
    pub gain: FloatParam,
    #[id = "bend_range"]
    pub bend_range: IntParam,
    #[id = "stereo"]
    pub stereoizer: BoolParam,
    #[id = "reuse_voices"]
    pub reuse_voices: BoolParam,
    #[id = "polyphony"]
    pub polyphony: IntParam,

    // Output limiter
    #[id = "lim_thresh"]
    pub limiter_threshold: FloatParam,
    #[id = "lim_bias"]
    pub limiter_bias: FloatParam,
    #[id = "lim_rms"]
    pub limiter_rms_window: FloatParam,
    #[id = "lim_makeup"]
    pub limiter_makeup: FloatParam,
}

impl Default for ResonareParams {
    fn default() -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let d = EngineParams::default();
        let env = d.noise.envelope;
        let dirty_ref = &dirty;

        Self {
            user_sample: RwLock::new(String::new()),

            mallet_type: choice("Mallet", 0, &MALLET_NAMES, dirty_ref),
            mallet_mix: percent("Mallet Mix", d.mallet.mix as f32, dirty_ref),
            mallet_res: percent("Mallet Resonance", d.mallet.res as f32, dirty_ref),
            mallet_stiffness: FloatParam::new(
                "Mallet Stiffness",
                d.mallet.stiffness as f32,
                FloatRange::Skewed {
                    min: 100.0,
                    max: 5000.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" Hz")
            .with_value_to_string(formatters::v2s_f32_rounded(0))
            .with_callback(mark_dirty(dirty_ref)),
            mallet_pitch: FloatParam::new(
                "Mallet Pitch",
                d.mallet.pitch as f32,
                FloatRange::Linear {
                    min: -48.0,
                    max: 48.0,
                },
            )
            .with_unit(" st")
            .with_step_size(0.01)
            .with_callback(mark_dirty(dirty_ref)),
            mallet_filter: bipolar("Mallet Filter", d.mallet.filter as f32, dirty_ref),
            mallet_keytrack: percent("Mallet Keytrack", d.mallet.keytrack as f32, dirty_ref),
            vel_mallet_mix: bipolar("Vel Mallet Mix", 0.0, dirty_ref),
            vel_mallet_res: bipolar("Vel Mallet Resonance", 0.0, dirty_ref),
            vel_mallet_stiffness: bipolar("Vel Mallet Stiffness", 0.0, dirty_ref),

            noise_osc: percent("Noise Osc", d.noise.osc as f32, dirty_ref),
            noise_mix: percent("Noise Mix", d.noise.mix as f32, dirty_ref),
            noise_res: percent("Noise Resonance", d.noise.res as f32, dirty_ref),
            noise_filter_mode: EnumParam::new("Noise Filter", NoiseFilter::Highpass)
                .with_callback(mark_dirty(dirty_ref)),
            noise_filter_freq: FloatParam::new(
                "Noise Frequency",
                d.noise.filter_freq as f32,
                FloatRange::Skewed {
                    min: 20.0,
                    max: 20000.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_value_to_string(formatters::v2s_f32_hz_then_khz(0))
            .with_string_to_value(formatters::s2v_f32_hz_then_khz())
            .with_callback(mark_dirty(dirty_ref)),
            noise_filter_q: FloatParam::new(
                "Noise Q",
                d.noise.filter_q as f32,
                FloatRange::Linear {
                    min: 0.707,
                    max: 4.0,
                },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(2))
            .with_callback(mark_dirty(dirty_ref)),
            noise_attack: stage_ms("Noise Attack", env.attack_ms as f32, dirty_ref),
            noise_decay: stage_ms("Noise Decay", env.decay_ms as f32, dirty_ref),
            noise_sustain: percent("Noise Sustain", env.sustain as f32, dirty_ref),
            noise_release: stage_ms("Noise Release", env.release_ms as f32, dirty_ref),
            noise_attack_tension: bipolar(
                "Noise Attack Tension",
                env.attack_tension as f32,
                dirty_ref,
            ),
            noise_decay_tension: bipolar("Noise Decay Tension", env.decay_tension as f32, dirty_ref),
            noise_release_tension: bipolar(
                "Noise Release Tension",
                env.release_tension as f32,
                dirty_ref,
            ),
            vel_noise_mix: bipolar("Vel Noise Mix", 0.0, dirty_ref),
            vel_noise_res: bipolar("Vel Noise Resonance", 0.0, dirty_ref),
            vel_noise_freq: bipolar("Vel Noise Frequency", 0.0, dirty_ref),
            vel_noise_q: bipolar("Vel Noise Q", 0.0, dirty_ref),
            vel_noise_attack: bipolar("Vel Noise Attack", 0.0, dirty_ref),
            vel_noise_decay: bipolar("Vel Noise Decay", 0.0, dirty_ref),
            vel_noise_sustain: bipolar("Vel Noise Sustain", 0.0, dirty_ref),
            vel_noise_release: bipolar("Vel Noise Release", 0.0, dirty_ref),

            a: ResonatorGroup::new("A", d.a.on, dirty_ref),
            b: ResonatorGroup::new("B", d.b.on, dirty_ref),

            coupling: EnumParam::new("Coupling", Couple::Parallel)
                .with_callback(mark_dirty(dirty_ref)),
            ab_mix: percent("A:B Mix", d.ab_mix as f32, dirty_ref),
            ab_split: FloatParam::new(
                "A:B Split",
                d.ab_split as f32,
                FloatRange::Skewed {
                    min: 0.0,
                    max: 1.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(3))
            .with_callback(mark_dirty(dirty_ref)),
            gain: FloatParam::new(
                "Gain",
                d.gain_db as f32,
                FloatRange::Linear {
                    min: -24.0,
                    max: 24.0,
                },
            )
            .with_unit(" dB")
            .with_step_size(0.1)
            .with_callback(mark_dirty(dirty_ref)),
            bend_range: IntParam::new(
                "Bend Range",
                d.bend_range as i32,
                IntRange::Linear { min: 0, max: 24 },
            )
            .with_unit(" st")
            .with_callback(mark_dirty(dirty_ref)),
            stereoizer: BoolParam::new("Stereoizer", d.stereoizer)
                .with_callback(mark_dirty(dirty_ref)),
            reuse_voices: BoolParam::new("Reuse Voices", d.reuse_voices)
                .with_callback(mark_dirty(dirty_ref)),
            polyphony: IntParam::new(
                "Polyphony",
                d.polyphony as i32,
                IntRange::Linear {
                    min: 1,
                    max: resonare_dsp::engine::MAX_POLYPHONY as i32,
                },
            )
            .with_callback(mark_dirty(dirty_ref)),

            limiter_threshold: FloatParam::new(
                "Limiter Threshold",
                d.limiter.threshold_db as f32,
                FloatRange::Linear {
                    min: -30.0,
                    max: 0.0,
                },
            )
            .with_unit(" dB")
            .with_step_size(0.1)
            .with_callback(mark_dirty(dirty_ref)),
            limiter_bias: FloatParam::new(
                "Limiter Bias",
                d.limiter.bias as f32,
                FloatRange::Linear {
                    min: 0.0,
                    max: 100.0,
                },
            )
            .with_unit(" %")
            .with_step_size(0.1)
            .with_callback(mark_dirty(dirty_ref)),
            limiter_rms_window: FloatParam::new(
                "Limiter RMS Window",
                d.limiter.rms_window_us as f32,
                FloatRange::Skewed {
                    min: 1.0,
                    max: 10000.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" us")
            .with_value_to_string(formatters::v2s_f32_rounded(0))
            .with_callback(mark_dirty(dirty_ref)),
            limiter_makeup: FloatParam::new(
                "Limiter Makeup",
                d.limiter.makeup_db as f32,
                FloatRange::Linear {
                    min: -12.0,
                    max: 12.0,
                },
            )
            .with_unit(" dB")
            .with_step_size(0.1)
            .with_callback(mark_dirty(dirty_ref)),

            dirty,
        }
    }
}

impl ResonareParams {
    /// True once since the last call if any parameter moved.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Native-range snapshot for the engine.
    pub fn snapshot(&self) -> EngineParams {
        let mallet_kind = match self.mallet_type.value() {
            0 => MalletKind::Impulse,
            1 => MalletKind::UserFile,
            i => InternalSample::ALL
                .get(i as usize - 2)
                .map_or(MalletKind::Impulse, |&s| MalletKind::Internal(s)),
        };

        EngineParams {
            mallet: MalletParams {
                kind: mallet_kind,
                mix: self.mallet_mix.value() as f64,
                res: self.mallet_res.value() as f64,
                stiffness: self.mallet_stiffness.value() as f64,
                pitch: self.mallet_pitch.value() as f64,
                filter: self.mallet_filter.value() as f64,
                keytrack: self.mallet_keytrack.value() as f64,
                vel_mix: self.vel_mallet_mix.value() as f64,
                vel_res: self.vel_mallet_res.value() as f64,
                vel_stiffness: self.vel_mallet_stiffness.value() as f64,
            },
            noise: NoiseParams {
                osc: self.noise_osc.value() as f64,
                mix: self.noise_mix.value() as f64,
                res: self.noise_res.value() as f64,
                filter_mode: self.noise_filter_mode.value().into(),
                filter_freq: self.noise_filter_freq.value() as f64,
                filter_q: self.noise_filter_q.value() as f64,
                envelope: EnvelopeShape {
                    attack_ms: self.noise_attack.value() as f64,
                    decay_ms: self.noise_decay.value() as f64,
                    sustain: self.noise_sustain.value() as f64,
                    release_ms: self.noise_release.value() as f64,
                    attack_tension: self.noise_attack_tension.value() as f64,
                    decay_tension: self.noise_decay_tension.value() as f64,
                    release_tension: self.noise_release_tension.value() as f64,
                },
                vel_mix: self.vel_noise_mix.value() as f64,
                vel_res: self.vel_noise_res.value() as f64,
                vel_freq: self.vel_noise_freq.value() as f64,
                vel_q: self.vel_noise_q.value() as f64,
                vel_attack: self.vel_noise_attack.value() as f64,
                vel_decay: self.vel_noise_decay.value() as f64,
                vel_sustain: self.vel_noise_sustain.value() as f64,
                vel_release: self.vel_noise_release.value() as f64,
            },
            a: self.a.snapshot(),
            b: self.b.snapshot(),
            coupling: self.coupling.value().into(),
            ab_mix: self.ab_mix.value() as f64,
            ab_split: self.ab_split.value() as f64,
            gain_db: self.gain.value() as f64,
            bend_range: self.bend_range.value() as f64,
            stereoizer: self.stereoizer.value(),
            reuse_voices: self.reuse_voices.value(),
            polyphony: self.polyphony.value() as usize,
            limiter: LimiterSettings {
                threshold_db: self.limiter_threshold.value() as f64,
                bias: self.limiter_bias.value() as f64,
                rms_window_us: self.limiter_rms_window.value() as f64,
                makeup_db: self.limiter_makeup.value() as f64,
            },
        }
    }
}
