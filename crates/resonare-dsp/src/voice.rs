/// Single voice: mallet + noise exciters feeding resonators A and B.
///
/// Signal flow per sample:
///   mallet ─┬─ mix ──────────────────────────────► direct
///           └─ res ─┐
///   noise ──┬─ mix ─┼────────────────────────────► direct
///           └─ res ─┤
///   audio in (held) ┘── feed ─► A ─(serial)─► B ─► a / b
///
/// A retrigger while either resonator still rings fades the old strike out
/// over 20 ms before the new one starts.

use crate::error::Error;
use crate::lookup::LookupTable;
use crate::mallet::{Mallet, Strike};
use crate::models::{Models, Ratios, MAX_PARTIALS};
use crate::noise::Noise;
use crate::params::{Coupling, EngineParams};
use crate::resonator::Resonator;
use crate::sampler::Sampler;
use crate::tables::skewed_velocity;

/// Retrigger declick time.
pub const FADE_MS: f64 = 20.0;
/// Ratio distance under which two modes of A and B are pushed apart.
const SPLIT_WINDOW: f64 = 4.0;
/// Maps the 0..1 split control onto the coupling strength `freq_shift` expects.
const SPLIT_SCALE: f64 = 100.0;
const STIFFNESS_MIN: f64 = 100.0;
const STIFFNESS_MAX: f64 = 5000.0;
/// Host slider skew of the noise mix and feed controls.
const NOISE_LEVEL_SKEW: f64 = 0.3;

/// Read-only state shared by every voice, built once per sample rate.
#[derive(Clone, Debug)]
pub struct SharedTables {
    pub models: Models,
    pub a1: LookupTable,
    pub sampler: Sampler,
}

impl SharedTables {
    pub fn new(sample_rate: f64, aspect_a: f64, aspect_b: f64) -> Result<Self, Error> {
        Ok(Self {
            models: Models::new(aspect_a, aspect_b),
            a1: LookupTable::biquad_a1(sample_rate)?,
            sampler: Sampler::new(),
        })
    }
}

/// One voice's contribution to the three buses.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VoiceOutput {
    pub direct: f64,
    pub a: f64,
    pub b: f64,
}

/// Exciter levels after velocity, fixed for the life of a strike.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ExciterGains {
    mallet_mix: f64,
    mallet_res: f64,
    noise_mix: f64,
    noise_res: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Voice {
    sample_rate: f64,
    note: u8,
    freq: f64,
    vel: f64,
    is_pressed: bool,
    is_release: bool,
    pressed_ts: u64,
    release_ts: u64,

    // Strike waiting for the fade to finish
    next_freq: f64,
    next_vel: f64,
    fading: bool,
    fade_total: u32,
    fade_remaining: u32,
    release_pending: bool,

    pitch_bend: f64,
    a_pitch: f64,
    b_pitch: f64,
    coupling: Coupling,
    split: f64,
    gains: ExciterGains,

    mallet: Mallet,
    noise: Noise,
    res_a: Resonator,
    res_b: Resonator,
}

impl Voice {
    /// `seed` decorrelates the noise exciter between voices.
    pub fn new(sample_rate: f64, seed: u32) -> Self {
        Self {
            sample_rate,
            note: 0,
            freq: 440.0,
            vel: 0.0,
            is_pressed: false,
            is_release: true,
            pressed_ts: 0,
            release_ts: 0,
            next_freq: 440.0,
            next_vel: 0.0,
            fading: false,
            fade_total: ((FADE_MS * 0.001 * sample_rate) as u32).max(1),
            fade_remaining: 0,
            release_pending: false,
            pitch_bend: 1.0,
            a_pitch: 1.0,
            b_pitch: 1.0,
            coupling: Coupling::Parallel,
            split: 0.0,
            gains: ExciterGains::default(),
            mallet: Mallet::new(sample_rate),
            noise: Noise::new(sample_rate, seed),
            res_a: Resonator::new(sample_rate),
            res_b: Resonator::new(sample_rate),
        }
    }

    /// Re-derive everything cached from the parameter snapshot.
    /// Call `update_resonators` afterwards to retune.
    pub fn configure(&mut self, params: &EngineParams) {
        self.noise.init(self.sample_rate, &params.noise);
        self.res_a.configure(&params.a);
        self.res_b.configure(&params.b);
        self.mallet.set_filter(params.mallet.filter);
        self.a_pitch = params.a.pitch_factor();
        self.b_pitch = params.b.pitch_factor();
        self.coupling = params.coupling;
        self.split = params.ab_split * SPLIT_SCALE;
        self.refresh_gains(params);
    }

    fn refresh_gains(&mut self, params: &EngineParams) {
        let vel = self.vel;
        let m = &params.mallet;
        let n = &params.noise;
        self.gains = ExciterGains {
            mallet_mix: (m.mix + m.vel_mix * vel).clamp(0.0, 1.0),
            mallet_res: (m.res + m.vel_res * vel).clamp(0.0, 1.0),
            noise_mix: skewed_velocity(n.mix, vel, n.vel_mix, NOISE_LEVEL_SKEW),
            noise_res: skewed_velocity(n.res, vel, n.vel_res, NOISE_LEVEL_SKEW),
        };
    }

    /// Start a note. `vel` is 0..1, `ts` orders voices for stealing.
    pub fn trigger(
        &mut self,
        note: u8,
        freq: f64,
        vel: f64,
        ts: u64,
        params: &EngineParams,
        tables: &SharedTables,
    ) {
        self.note = note;
        self.next_freq = freq;
        self.next_vel = vel.clamp(0.0, 1.0);
        self.is_pressed = true;
        self.is_release = false;
        self.pressed_ts = ts;
        self.release_pending = false;

        let ringing = (self.res_a.is_on() && self.res_a.is_active())
            || (self.res_b.is_on() && self.res_b.is_active());
        if ringing {
            self.fading = true;
            self.fade_remaining = self.fade_total;
        } else {
            self.fading = false;
            self.trigger_start(params, tables);
        }
    }

    fn trigger_start(&mut self, params: &EngineParams, tables: &SharedTables) {
        self.res_a.clear();
        self.res_b.clear();
        self.freq = self.next_freq;
        self.vel = self.next_vel;
        self.refresh_gains(params);

        let m = &params.mallet;
        let stiffness = (m.stiffness.max(STIFFNESS_MIN).ln()
            + self.vel * m.vel_stiffness * 2.0 * (STIFFNESS_MAX.ln() - STIFFNESS_MIN.ln()))
        .exp()
        .clamp(STIFFNESS_MIN, STIFFNESS_MAX);
        let strike = Strike {
            kind: m.kind,
            freq: stiffness,
            note: self.note,
            pitch: m.pitch,
            keytrack: m.keytrack,
        };
        self.mallet.trigger(&strike, &tables.sampler);
        self.noise.attack(self.vel);
        if self.release_pending {
            self.release_pending = false;
            self.noise.release();
        }

        if self.res_a.is_on() {
            self.res_a.activate();
        }
        if self.res_b.is_on() {
            self.res_b.activate();
        }
        self.update_resonators(tables);
    }

    /// Advance the retrigger fade one sample; returns the gain for the old strike.
    fn fade_out(&mut self, params: &EngineParams, tables: &SharedTables) -> f64 {
        self.fade_remaining = self.fade_remaining.saturating_sub(1);
        if self.fade_remaining == 0 {
            self.fading = false;
            self.trigger_start(params, tables);
            return 1.0;
        }
        self.fade_remaining as f64 / self.fade_total as f64
    }

    pub fn release(&mut self, ts: u64, tables: &SharedTables) {
        self.is_pressed = false;
        self.is_release = true;
        self.release_ts = ts;
        if self.fading {
            self.release_pending = true;
            return;
        }
        self.noise.release();
        self.update_resonators(tables);
    }

    /// Silence everything immediately.
    pub fn clear(&mut self) {
        self.mallet.clear();
        self.noise.clear();
        self.res_a.deactivate();
        self.res_b.deactivate();
        self.fading = false;
        self.fade_remaining = 0;
        self.release_pending = false;
        self.is_pressed = false;
        self.is_release = true;
    }

    /// Retune both resonators from the model tables, pitch offsets and coupling.
    pub fn update_resonators(&mut self, tables: &SharedTables) {
        let model_a = self.res_a.model();
        let model_b = self.res_b.model();
        let mut ratios_a = tables.models.a.ratios_at(model_a, self.freq);
        let mut ratios_b = tables.models.b.ratios_at(model_b, self.freq);
        ratios_a.iter_mut().for_each(|r| *r *= self.a_pitch);
        ratios_b.iter_mut().for_each(|r| *r *= self.b_pitch);

        if self.coupling == Coupling::Serial && self.res_a.is_on() && self.res_b.is_on() {
            let (shift_a, shift_b) = frequency_shifts(&ratios_a, &ratios_b, self.freq, self.split);
            for i in 0..MAX_PARTIALS {
                ratios_a[i] += shift_a[i];
                ratios_b[i] += shift_b[i];
            }
        }

        let (freq, vel, release, bend) = (self.freq, self.vel, self.is_release, self.pitch_bend);
        if self.res_a.is_on() {
            self.res_a
                .update(freq, vel, release, bend, &ratios_a, tables.models.a.gains(model_a));
        }
        if self.res_b.is_on() {
            self.res_b
                .update(freq, vel, release, bend, &ratios_b, tables.models.b.gains(model_b));
        }
    }

    /// Retune to a new bend through the cheap path. No-op if unchanged.
    pub fn apply_pitch_bend(&mut self, bend: f64, tables: &SharedTables) {
        if bend == self.pitch_bend {
            return;
        }
        self.pitch_bend = bend;
        if self.res_a.is_on() {
            self.res_a.apply_pitch_bend(bend, &tables.a1);
        }
        if self.res_b.is_on() {
            self.res_b.apply_pitch_bend(bend, &tables.a1);
        }
    }

    #[inline]
    pub fn process(
        &mut self,
        params: &EngineParams,
        tables: &SharedTables,
        audio_in: f64,
    ) -> VoiceOutput {
        let fade = if self.fading { self.fade_out(params, tables) } else { 1.0 };
        let mut direct = 0.0;
        let mut feed = 0.0;

        let m = self.mallet.process(&tables.sampler);
        if m != 0.0 {
            direct += m * self.gains.mallet_mix * fade;
            feed += m * self.gains.mallet_res;
        }

        if audio_in != 0.0 && self.is_pressed {
            feed += audio_in;
        }

        let n = self.noise.process();
        if self.noise.is_active() {
            let np = &params.noise;
            let osc = if np.osc > 0.0 && (np.res > 0.0 || np.vel_res > 0.0) {
                let tones = self.res_a.process_oscillators() + self.res_b.process_oscillators();
                self.noise.process_osc(tones) * np.osc
            } else {
                0.0
            };
            direct += n * self.gains.noise_mix * fade;
            feed += (n * (1.0 - np.osc) + osc) * self.gains.noise_res;
        }

        let mut out = VoiceOutput {
            direct,
            ..VoiceOutput::default()
        };
        let mut from_a = 0.0;
        if self.res_a.is_on() {
            from_a = self.res_a.process(feed);
            out.a = from_a * fade;
        }
        if self.res_b.is_on() {
            let input = if self.res_a.is_on() && self.coupling == Coupling::Serial {
                from_a
            } else {
                feed
            };
            out.b = self.res_b.process(input) * fade;
        }
        out
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn is_pressed(&self) -> bool {
        self.is_pressed
    }

    pub fn is_release(&self) -> bool {
        self.is_release
    }

    pub fn is_fading(&self) -> bool {
        self.fading
    }

    pub fn pressed_ts(&self) -> u64 {
        self.pressed_ts
    }

    pub fn release_ts(&self) -> u64 {
        self.release_ts
    }

    pub fn frequency(&self) -> f64 {
        self.freq
    }

    /// Whether anything in the voice can still produce sound.
    pub fn is_sounding(&self) -> bool {
        self.fading
            || self.mallet.is_active()
            || self.noise.is_active()
            || (self.res_a.is_on() && self.res_a.is_active())
            || (self.res_b.is_on() && self.res_b.is_active())
    }
}

/// Split amount for one pair of close modes, in Hz.
///
/// The cosine term detunes the coupling strength pair by pair so split modes
/// do not all beat in sync.
fn freq_shift(fa: f64, fb: f64, split: f64) -> f64 {
    let avg = (fa + fb) * 0.5;
    let k = split + avg.cos() / 5.0;
    let w = avg + (((fa - fb) * 0.5).powi(2) + (k / 2.5).powi(2)).sqrt();
    (fa.max(fb) - w).abs()
}

/// Ratio offsets that push apart close modes of serially coupled resonators.
///
/// For every mode pair `(a[i], b[j])` within 4 ratio units, the higher mode
/// moves up and the lower moves down by the same amount. Returns the offsets
/// for A and B; every pair contributes equal and opposite amounts.
pub fn frequency_shifts(a: &Ratios, b: &Ratios, freq: f64, split: f64) -> (Ratios, Ratios) {
    let mut shift_a = [0.0; MAX_PARTIALS];
    let mut shift_b = [0.0; MAX_PARTIALS];
    if !(freq.is_finite() && freq > 0.0) {
        return (shift_a, shift_b);
    }
    for (i, &fa) in a.iter().enumerate() {
        for (j, &fb) in b.iter().enumerate() {
            if (fa - fb).abs() > SPLIT_WINDOW {
                continue;
            }
            let s = freq_shift(fa * freq, fb * freq, split) / freq;
            let signed = if fa > fb { s } else { -s };
            shift_a[i] += signed;
            shift_b[j] -= signed;
        }
    }
    (shift_a, shift_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Model;
    use crate::params::ResonatorParams;

    const SR: f64 = 48000.0;

    fn setup(params: &EngineParams) -> (Voice, SharedTables) {
        let tables = SharedTables::new(SR, params.a.ratio, params.b.ratio).unwrap();
        let mut voice = Voice::new(SR, 1);
        voice.configure(params);
        (voice, tables)
    }

    fn ratios(f: impl Fn(usize) -> f64) -> Ratios {
        std::array::from_fn(f)
    }

    #[test]
    fn test_shifts_cancel_in_total() {
        let a = ratios(|i| 1.0 + i as f64 * 0.73);
        let b = ratios(|i| 1.11 + i as f64 * 0.91);
        let (sa, sb) = frequency_shifts(&a, &b, 220.0, 0.2);
        let total: f64 = sa.iter().sum::<f64>() + sb.iter().sum::<f64>();
        assert!(total.abs() < 1e-9, "total {total}");
        assert!(sa.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_single_pair_moves_apart() {
        let mut a = [1000.0; MAX_PARTIALS];
        let mut b = [2000.0; MAX_PARTIALS];
        a[0] = 2.0;
        b[0] = 1.5;
        let (sa, sb) = frequency_shifts(&a, &b, 100.0, 0.5);
        // Only (a[0], b[0]) fall within the window
        assert!(sa[0] > 0.0, "higher mode moves up");
        assert!(sb[0] < 0.0, "lower mode moves down");
        assert_eq!(sa[0], -sb[0]);
        assert!(sa[1..].iter().all(|&s| s == 0.0));
        assert!(sb[1..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_swapped_arguments_swap_shifts() {
        let a = ratios(|i| 1.0 + i as f64 * 1.37);
        let b = ratios(|i| 1.05 + i as f64 * std::f64::consts::FRAC_PI_2);
        let (sa, sb) = frequency_shifts(&a, &b, 330.0, 0.1);
        let (sb2, sa2) = frequency_shifts(&b, &a, 330.0, 0.1);
        for i in 0..MAX_PARTIALS {
            assert!((sa[i] - sa2[i]).abs() < 1e-12);
            assert!((sb[i] - sb2[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_full_split_moves_modes_tens_of_hz() {
        let mut params = EngineParams::default();
        params.ab_split = 1.0;
        let (voice, _) = setup(&params);
        assert_eq!(voice.split, 100.0);

        let harmonic = ratios(|i| (i + 1) as f64);
        let (sa, _) = frequency_shifts(&harmonic, &harmonic, 220.0, voice.split);
        let hz = (sa[0] * 220.0).abs();
        assert!(hz > 10.0, "fundamental moved only {hz} Hz");

        // The minimum control still leaves the modes nearly in place
        params.ab_split = 0.01;
        let (voice, _) = setup(&params);
        let (sa, _) = frequency_shifts(&harmonic, &harmonic, 220.0, voice.split);
        assert!((sa[0] * 220.0).abs() < hz);
    }

    #[test]
    fn test_distant_modes_unshifted() {
        let a = ratios(|i| 1.0 + i as f64 * 20.0);
        let b = ratios(|i| 10.0 + i as f64 * 20.0);
        let (sa, sb) = frequency_shifts(&a, &b, 100.0, 1.0);
        assert!(sa.iter().chain(sb.iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn test_idle_voice_starts_immediately() {
        let params = EngineParams::default();
        let (mut voice, tables) = setup(&params);
        voice.trigger(60, 261.63, 0.8, 1, &params, &tables);
        assert!(!voice.is_fading());
        assert!(voice.is_pressed());
        let out: Vec<VoiceOutput> = (0..2400).map(|_| voice.process(&params, &tables, 0.0)).collect();
        assert!(out.iter().any(|o| o.a.abs() > 1e-4));
        assert!(out.iter().all(|o| o.b == 0.0), "B is off by default");
    }

    #[test]
    fn test_retrigger_fades_then_restarts() {
        let params = EngineParams::default();
        let (mut voice, tables) = setup(&params);
        voice.trigger(60, 261.63, 0.8, 1, &params, &tables);
        for _ in 0..1000 {
            voice.process(&params, &tables, 0.0);
        }
        voice.trigger(64, 329.63, 0.5, 2, &params, &tables);
        assert!(voice.is_fading());
        assert_eq!(voice.note(), 64);
        let fade_len = (FADE_MS * 0.001 * SR) as usize;
        for _ in 0..fade_len {
            voice.process(&params, &tables, 0.0);
        }
        assert!(!voice.is_fading());
        assert!((voice.frequency() - 329.63).abs() < 1e-9);
    }

    #[test]
    fn test_release_during_fade_applies_after_start() {
        let params = EngineParams::default();
        let (mut voice, tables) = setup(&params);
        voice.trigger(60, 261.63, 0.8, 1, &params, &tables);
        voice.process(&params, &tables, 0.0);
        voice.trigger(62, 293.66, 0.8, 2, &params, &tables);
        voice.release(3, &tables);
        assert!(!voice.is_pressed());
        assert!(voice.release_pending);
        for _ in 0..(SR as usize / 10) {
            voice.process(&params, &tables, 0.0);
        }
        assert!(!voice.release_pending);
        assert!(voice.is_release());
        assert_eq!(voice.release_ts(), 3);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let params = EngineParams::default();
        let (mut voice, tables) = setup(&params);
        voice.trigger(48, 130.81, 1.0, 1, &params, &tables);
        for _ in 0..256 {
            voice.process(&params, &tables, 0.0);
        }
        voice.clear();
        let once = voice.clone();
        voice.clear();
        assert_eq!(voice, once);
        assert!(!voice.is_sounding());
        assert_eq!(voice.process(&params, &tables, 0.0), VoiceOutput::default());
    }

    #[test]
    fn test_serial_coupling_feeds_b_from_a() {
        let params = EngineParams {
            coupling: Coupling::Serial,
            b: ResonatorParams {
                on: true,
                model: Model::Marimba,
                ..ResonatorParams::default()
            },
            ..EngineParams::default()
        };
        let (mut voice, tables) = setup(&params);
        voice.trigger(57, 220.0, 0.7, 1, &params, &tables);
        let out: Vec<VoiceOutput> = (0..4800).map(|_| voice.process(&params, &tables, 0.0)).collect();
        assert!(out.iter().any(|o| o.b.abs() > 1e-6));
    }

    #[test]
    fn test_audio_input_excites_only_held_voice() {
        let params = EngineParams {
            mallet: crate::params::MalletParams {
                res: 0.0,
                ..Default::default()
            },
            ..EngineParams::default()
        };
        let (mut voice, tables) = setup(&params);
        voice.trigger(60, 261.63, 0.5, 1, &params, &tables);
        let held: f64 = (0..2400)
            .map(|n| voice.process(&params, &tables, if n < 10 { 0.5 } else { 0.0 }).a.abs())
            .sum();
        assert!(held > 0.0);

        voice.release(2, &tables);
        voice.clear();
        voice.trigger(60, 261.63, 0.5, 3, &params, &tables);
        voice.release(4, &tables);
        let released: f64 = (0..2400)
            .map(|n| voice.process(&params, &tables, if n < 10 { 0.5 } else { 0.0 }).a.abs())
            .sum();
        assert_eq!(released, 0.0);
    }

    #[test]
    fn test_pitch_bend_retunes_only_on_change() {
        let params = EngineParams::default();
        let (mut voice, tables) = setup(&params);
        voice.trigger(69, 440.0, 0.5, 1, &params, &tables);
        let before = voice.clone();
        voice.apply_pitch_bend(1.0, &tables);
        assert_eq!(voice, before);
        voice.apply_pitch_bend(2.0, &tables);
        assert_ne!(voice, before);
    }
}
