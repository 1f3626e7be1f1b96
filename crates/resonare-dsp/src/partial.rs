/// One resonant mode: a two-pole bandpass tuned to `f0 * ratio`, with a matched sine oscillator.
///
/// `update` derives every coefficient from the resonator controls; `apply_pitch_bend`
/// only moves the pole angle through the shared `a1` table. A mode that lands outside
/// 20 Hz..20 kHz (or at or above Nyquist) is flagged out of range and outputs silence while
/// keeping its filter history.

use std::f64::consts::PI;

use crate::lookup::LookupTable;
use crate::params::ResonatorParams;
use crate::tables::{log_velocity, MAX_FREQ, MIN_FREQ};

/// Excitation gain applied to every mode.
const MODE_GAIN: f64 = 35.0;
const MIN_INHARM: f64 = 0.0001;
const MIN_DECAY: f64 = 0.01;
const MAX_DECAY: f64 = 100.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Partial {
    /// Mode number, 1-based.
    k: usize,
    sample_rate: f64,
    decay: f64,
    damp: f64,
    tone: f64,
    hit: f64,
    release: f64,
    inharm: f64,
    vel_decay: f64,
    vel_hit: f64,
    vel_inharm: f64,
    vel_damp: f64,
    vel_tone: f64,

    base_f_k: f64,
    f_k: f64,
    out_of_range: bool,
    /// Zero decay. Bending alone cannot bring the mode back.
    silent: bool,

    a0: f64,
    b0: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,

    osc_phase: f64,
    osc_inc: f64,
    osc_amp: f64,
}

impl Partial {
    pub fn new(k: usize, sample_rate: f64) -> Self {
        Self {
            k: k.max(1),
            sample_rate,
            decay: 1.0,
            damp: 0.0,
            tone: 0.0,
            hit: 0.26,
            release: 1.0,
            inharm: MIN_INHARM,
            vel_decay: 0.0,
            vel_hit: 0.0,
            vel_inharm: 0.0,
            vel_damp: 0.0,
            vel_tone: 0.0,
            base_f_k: 0.0,
            f_k: 0.0,
            out_of_range: true,
            silent: true,
            a0: 1.0,
            b0: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            osc_phase: 0.0,
            osc_inc: 0.0,
            osc_amp: 0.0,
        }
    }

    /// Copy the shared resonator controls.
    pub fn configure(&mut self, sample_rate: f64, p: &ResonatorParams) {
        self.sample_rate = sample_rate;
        self.decay = p.decay;
        self.damp = p.damp;
        self.tone = p.tone;
        self.hit = p.hit;
        self.release = p.release;
        self.inharm = p.inharm;
        self.vel_decay = p.vel_decay;
        self.vel_hit = p.vel_hit;
        self.vel_inharm = p.vel_inharm;
        self.vel_damp = p.vel_damp;
        self.vel_tone = p.vel_tone;
    }

    fn in_band(&self, f: f64) -> bool {
        (MIN_FREQ..MAX_FREQ).contains(&f) && f < self.sample_rate * 0.5
    }

    /// Retune and reshape this mode.
    ///
    /// - `f0`: voice fundamental in Hz
    /// - `ratio`: this mode's ratio to `f0`
    /// - `ratio_max`: highest ratio in the bank, anchoring damping and tone above `f0`
    /// - `vel`: 0..1
    /// - `gain`: per-mode model gain
    pub fn update(
        &mut self,
        f0: f64,
        ratio: f64,
        ratio_max: f64,
        vel: f64,
        pitch_bend: f64,
        is_release: bool,
        gain: f64,
    ) {
        let stretch = ((self.inharm.max(MIN_INHARM).ln() + vel * self.vel_inharm * -(MIN_INHARM.ln()))
            .exp()
            - MIN_INHARM)
            .clamp(0.0, 1.0);
        let inharm_k = (1.0 + stretch * (ratio - 1.0).powi(2)).sqrt();

        self.base_f_k = f0 * ratio * inharm_k;
        self.f_k = self.base_f_k * pitch_bend;

        let mut decay_k = log_velocity(self.decay, vel, self.vel_decay, MIN_DECAY, MAX_DECAY);
        if is_release {
            decay_k *= self.release;
        }

        self.silent = decay_k <= 0.0;
        self.out_of_range = self.silent || !self.in_band(self.f_k);
        if self.silent || self.f_k <= 0.0 {
            return;
        }

        // Coefficients are kept current out of band so a later bend can bring the mode in

        let f_max = (f0 * ratio_max * inharm_k).min(MAX_FREQ);
        let omega = 2.0 * PI * self.f_k / self.sample_rate;
        let alpha = 2.0 * PI / self.sample_rate;

        let damp_base = (self.damp + self.vel_damp * 2.0 * vel).clamp(-1.0, 1.0);
        let damp_k = if damp_base <= 0.0 {
            (f0 / self.f_k).powf(damp_base * 2.0)
        } else {
            (f_max / self.f_k).powf(damp_base * 2.0)
        };
        decay_k /= damp_k;

        let tone_base = (self.tone + self.vel_tone * 2.0 * vel).clamp(-1.0, 1.0);
        let tone_gain = if tone_base <= 0.0 {
            (self.f_k / f0).powf(tone_base * 2.0)
        } else {
            (self.f_k / f_max).powf(tone_base * 2.0)
        };

        let hit = (self.hit + self.vel_hit * vel * 0.5).clamp(0.02, 0.5);
        let amp_k = (PI * self.k as f64 * hit).sin().abs() * MODE_GAIN;

        self.b0 = alpha * tone_gain * amp_k * gain;
        self.b2 = -self.b0;
        self.a0 = 1.0 + alpha / decay_k;
        self.a1 = -2.0 * omega.cos();
        self.a2 = 1.0 - alpha / decay_k;

        self.osc_inc = omega;
        self.osc_amp = tone_gain * amp_k * gain / MODE_GAIN;
    }

    /// Move the resonant peak to `base_f_k * bend` without touching decay or gain.
    pub fn apply_pitch_bend(&mut self, bend: f64, a1_table: &LookupTable) {
        self.f_k = self.base_f_k * bend;
        if self.silent || !self.in_band(self.f_k) {
            self.out_of_range = true;
            return;
        }
        self.out_of_range = false;
        self.a1 = a1_table.linear(self.f_k);
        self.osc_inc = 2.0 * PI * self.f_k / self.sample_rate;
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        if self.out_of_range {
            return 0.0;
        }
        let y = ((self.b0 * x + self.b2 * self.x2) - (self.a1 * self.y1 + self.a2 * self.y2)) / self.a0;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Next sample of the matched sine oscillator.
    #[inline]
    pub fn process_osc(&mut self) -> f64 {
        if self.out_of_range {
            return 0.0;
        }
        let y = self.osc_phase.sin() * self.osc_amp;
        self.osc_phase += self.osc_inc;
        if self.osc_phase >= 2.0 * PI {
            self.osc_phase -= 2.0 * PI;
        }
        y
    }

    pub fn is_out_of_range(&self) -> bool {
        self.out_of_range
    }

    pub fn frequency(&self) -> f64 {
        self.f_k
    }

    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
        self.osc_phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    fn partial(k: usize) -> Partial {
        let mut p = Partial::new(k, SR);
        p.configure(SR, &ResonatorParams::default());
        p
    }

    #[test]
    fn test_out_of_range_is_silent() {
        let mut p = partial(1);
        p.update(1000.0, 50.0, 64.0, 0.8, 1.0, false, 1.0);
        assert!(p.is_out_of_range());
        for x in [0.0, 1.0, -3.5, 1e6] {
            assert_eq!(p.process(x), 0.0);
        }
        assert_eq!(p.process_osc(), 0.0);
    }

    #[test]
    fn test_below_band_is_out_of_range() {
        let mut p = partial(1);
        p.update(10.0, 1.0, 4.0, 0.5, 1.0, false, 1.0);
        assert!(p.is_out_of_range());
    }

    #[test]
    fn test_rings_at_tuned_frequency() {
        let mut p = partial(1);
        let f = 440.0;
        p.update(f, 1.0, 4.0, 0.5, 1.0, false, 1.0);
        assert!(!p.is_out_of_range());

        p.process(1.0);
        let out: Vec<f64> = (0..(SR as usize / 4)).map(|_| p.process(0.0)).collect();
        // Count zero crossings over the window
        let crossings = out.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
        let expected = f * 0.25;
        assert!((crossings as f64 - expected).abs() <= 2.0, "{crossings} vs {expected}");
    }

    #[test]
    fn test_release_shortens_decay() {
        let mut params = ResonatorParams::default();
        params.release = 0.1;
        let energy = |is_release: bool| {
            let mut p = Partial::new(1, SR);
            p.configure(SR, &params);
            p.update(300.0, 1.0, 4.0, 0.5, 1.0, is_release, 1.0);
            p.process(1.0);
            (0..(SR as usize)).map(|_| p.process(0.0).powi(2)).skip(12000).sum::<f64>()
        };
        assert!(energy(false) > energy(true) * 10.0);
    }

    #[test]
    fn test_hit_position_nulls_modes() {
        // Striking at the middle silences even modes
        let mut params = ResonatorParams::default();
        params.hit = 0.5;
        let mut p2 = Partial::new(2, SR);
        p2.configure(SR, &params);
        p2.update(200.0, 2.0, 4.0, 0.0, 1.0, false, 1.0);
        p2.process(1.0);
        let peak = (0..1000).map(|_| p2.process(0.0).abs()).fold(0.0f64, f64::max);
        assert!(peak < 1e-12, "even mode at centre strike: {peak}");
    }

    #[test]
    fn test_pitch_bend_matches_full_update() {
        let table = LookupTable::biquad_a1(SR).unwrap();
        let mut bent = partial(1);
        bent.update(440.0, 1.0, 4.0, 0.5, 1.0, false, 1.0);
        bent.apply_pitch_bend(1.5, &table);

        let mut direct = partial(1);
        direct.update(440.0, 1.0, 4.0, 0.5, 1.5, false, 1.0);
        assert!((bent.a1 - direct.a1).abs() < 1e-6);
        assert!((bent.frequency() - 660.0).abs() < 1e-9);

        // Bending past the band flags the mode, bending back restores it
        bent.apply_pitch_bend(100.0, &table);
        assert!(bent.is_out_of_range());
        bent.apply_pitch_bend(1.0, &table);
        assert!(!bent.is_out_of_range());
    }

    #[test]
    fn test_bend_into_band_rings_like_full_update() {
        let table = LookupTable::biquad_a1(SR).unwrap();
        let mut bent = partial(1);
        bent.update(21000.0, 1.0, 1.0, 0.5, 1.0, false, 1.0);
        assert!(bent.is_out_of_range());
        bent.apply_pitch_bend(0.9, &table);
        assert!(!bent.is_out_of_range());

        let mut direct = partial(1);
        direct.update(21000.0, 1.0, 1.0, 0.5, 0.9, false, 1.0);
        assert!(!direct.is_out_of_range());

        let peak = |p: &mut Partial| {
            let first = p.process(1.0).abs();
            (0..2000).map(|_| p.process(0.0).abs()).fold(first, f64::max)
        };
        let (b, d) = (peak(&mut bent), peak(&mut direct));
        assert!(d > 1e-6, "direct update is silent");
        assert!((b - d).abs() < d * 0.05, "bent {b} vs direct {d}");
    }

    #[test]
    fn test_oscillator_tracks_mode_frequency() {
        let mut p = partial(1);
        p.update(1000.0, 1.0, 4.0, 0.5, 1.0, false, 1.0);
        let out: Vec<f64> = (0..(SR as usize / 10)).map(|_| p.process_osc()).collect();
        let crossings = out.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
        assert!((crossings as i64 - 100).abs() <= 1, "{crossings}");
    }
}
