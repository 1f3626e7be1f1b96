/// Noise exciter: white noise through a velocity-tracked filter, gated by an envelope.
///
/// The same filter settings drive a second filter used when the exciter is fed
/// from the resonators' sine oscillators instead of white noise.

use crate::envelope::{Envelope, EnvelopeShape};
use crate::error::Error;
use crate::filters::Biquad;
use crate::params::NoiseParams;
use crate::tables::{log_velocity, MAX_FREQ, MIN_FREQ};

const MIN_Q: f64 = 0.707;
const MAX_Q: f64 = 4.0;
/// Envelope stage-time range used for velocity scaling, in ms.
const MIN_STAGE_MS: f64 = 1.0;
const MAX_STAGE_MS: f64 = 20000.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    Lowpass,
    Bandpass,
    #[default]
    Highpass,
}

impl TryFrom<usize> for FilterMode {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self, Error> {
        match index {
            0 => Ok(FilterMode::Lowpass),
            1 => Ok(FilterMode::Bandpass),
            2 => Ok(FilterMode::Highpass),
            other => Err(Error::UnknownFilterMode(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Noise {
    sample_rate: f64,
    params: NoiseParams,
    filter_active: bool,
    env: Envelope,
    filter: Biquad,
    osc_filter: Biquad,
    rng_state: u32,
}

impl Noise {
    /// `seed` decorrelates the noise of simultaneous voices.
    pub fn new(sample_rate: f64, seed: u32) -> Self {
        let mut noise = Self {
            sample_rate,
            params: NoiseParams::default(),
            filter_active: false,
            env: Envelope::default(),
            filter: Biquad::default(),
            osc_filter: Biquad::default(),
            rng_state: seed,
        };
        noise.init(sample_rate, &NoiseParams::default());
        noise
    }

    pub fn init(&mut self, sample_rate: f64, params: &NoiseParams) {
        self.sample_rate = sample_rate;
        self.params = *params;
        self.env.init(sample_rate, &params.envelope);
        self.init_filter(0.0);
    }

    fn init_filter(&mut self, vel: f64) {
        let p = &self.params;
        let freq = log_velocity(p.filter_freq, vel, p.vel_freq, MIN_FREQ, MAX_FREQ);
        let q = (p.filter_q + vel * p.vel_q * (MAX_Q - MIN_Q)).clamp(MIN_Q, MAX_Q);

        self.filter_active = match p.filter_mode {
            FilterMode::Bandpass => true,
            FilterMode::Lowpass => freq < MAX_FREQ,
            FilterMode::Highpass => freq > MIN_FREQ,
        };

        let sr = self.sample_rate;
        for f in [&mut self.filter, &mut self.osc_filter] {
            match p.filter_mode {
                FilterMode::Lowpass => f.set_lowpass(freq, q, sr),
                FilterMode::Bandpass => f.set_bandpass(freq, q, sr),
                FilterMode::Highpass => f.set_highpass(freq, q, sr),
            }
        }
    }

    /// Stage times and sustain for this strike, with velocity applied.
    fn velocity_shape(&self, vel: f64) -> EnvelopeShape {
        let p = &self.params;
        let e = &p.envelope;
        let time = |ms: f64, amount: f64| log_velocity(ms, vel, amount, MIN_STAGE_MS, MAX_STAGE_MS);
        EnvelopeShape {
            attack_ms: time(e.attack_ms, p.vel_attack),
            decay_ms: time(e.decay_ms, p.vel_decay),
            sustain: (e.sustain + vel * p.vel_sustain).clamp(0.0, 1.0),
            release_ms: time(e.release_ms, p.vel_release),
            ..*e
        }
    }

    /// Start a strike. `vel` is 0..1.
    pub fn attack(&mut self, vel: f64) {
        self.init_filter(vel);
        let shape = self.velocity_shape(vel);
        self.env.init(self.sample_rate, &shape);
        self.env.attack(1.0);
    }

    pub fn release(&mut self) {
        self.env.release();
    }

    fn next_noise(&mut self) -> f64 {
        self.rng_state = self.rng_state.wrapping_mul(1664525).wrapping_add(1013904223);
        (self.rng_state as i32 as f64) / (i32::MAX as f64)
    }

    /// Next enveloped white-noise sample.
    #[inline]
    pub fn process(&mut self) -> f64 {
        if self.env.is_off() {
            return 0.0;
        }
        self.env.process();
        let mut sample = self.next_noise();
        if self.filter_active {
            sample = self.filter.process(sample);
        }
        if self.env.is_off() {
            self.filter.clear(0.0);
            self.osc_filter.clear(0.0);
        }
        sample * self.env.level()
    }

    /// Filter and envelope an external oscillator signal. Call after `process`
    /// for the same sample, which advances the envelope.
    #[inline]
    pub fn process_osc(&mut self, x: f64) -> f64 {
        if self.env.is_off() {
            return 0.0;
        }
        let y = if self.filter_active { self.osc_filter.process(x) } else { x };
        y * self.env.level()
    }

    pub fn is_active(&self) -> bool {
        !self.env.is_off()
    }

    pub fn clear(&mut self) {
        self.env.reset();
        self.filter.clear(0.0);
        self.osc_filter.clear(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn params(mode: FilterMode, freq: f64) -> NoiseParams {
        NoiseParams {
            filter_mode: mode,
            filter_freq: freq,
            envelope: EnvelopeShape {
                attack_ms: 1.0,
                decay_ms: 50.0,
                sustain: 0.0,
                release_ms: 20.0,
                ..EnvelopeShape::default()
            },
            ..NoiseParams::default()
        }
    }

    #[test]
    fn test_filter_mode_from_index() {
        assert_eq!(FilterMode::try_from(0).unwrap(), FilterMode::Lowpass);
        assert_eq!(FilterMode::try_from(1).unwrap(), FilterMode::Bandpass);
        assert_eq!(FilterMode::try_from(2).unwrap(), FilterMode::Highpass);
        assert!(matches!(FilterMode::try_from(3), Err(Error::UnknownFilterMode(3))));
    }

    #[test]
    fn test_silent_until_attacked() {
        let mut noise = Noise::new(SR, 1);
        for _ in 0..100 {
            assert_eq!(noise.process(), 0.0);
        }
    }

    #[test]
    fn test_burst_decays_and_stops() {
        let mut noise = Noise::new(SR, 0x1234_5678);
        noise.init(SR, &params(FilterMode::Bandpass, 2000.0));
        noise.attack(1.0);
        let buf: Vec<f64> = (0..(SR as usize)).map(|_| noise.process()).collect();

        let early: f64 = buf[100..1100].iter().map(|x| x * x).sum();
        let late: f64 = buf[2000..3000].iter().map(|x| x * x).sum();
        assert!(early > late * 4.0, "early {early} late {late}");
        assert!(buf.iter().all(|x| x.abs() < 2.0));
        // Sustain 0 holds at zero, release ends it
        noise.release();
        for _ in 0..2000 {
            noise.process();
        }
        assert!(!noise.is_active());
        assert_eq!(noise.process(), 0.0);
    }

    #[test]
    fn test_filter_activity_by_mode() {
        let mut noise = Noise::new(SR, 7);
        noise.init(SR, &params(FilterMode::Lowpass, 20000.0));
        assert!(!noise.filter_active);
        noise.init(SR, &params(FilterMode::Highpass, 20.0));
        assert!(!noise.filter_active);
        noise.init(SR, &params(FilterMode::Highpass, 500.0));
        assert!(noise.filter_active);
        noise.init(SR, &params(FilterMode::Bandpass, 20000.0));
        assert!(noise.filter_active);
    }

    #[test]
    fn test_velocity_raises_filter_frequency() {
        let mut p = params(FilterMode::Lowpass, 200.0);
        p.vel_freq = 1.0;
        let mut noise = Noise::new(SR, 3);
        noise.init(SR, &p);
        // Full velocity with full sensitivity opens the lowpass completely
        noise.attack(1.0);
        assert!(!noise.filter_active);
        noise.attack(0.0);
        assert!(noise.filter_active);
    }

    #[test]
    fn test_process_osc_follows_envelope() {
        let mut noise = Noise::new(SR, 3);
        noise.init(SR, &params(FilterMode::Lowpass, 20000.0));
        assert_eq!(noise.process_osc(1.0), 0.0);
        noise.attack(1.0);
        for _ in 0..60 {
            noise.process();
        }
        let y = noise.process_osc(1.0);
        assert!(y > 0.5 && y <= 1.0, "osc through open filter: {y}");
    }
}
