/// Tube waveguide: a circular delay line with fractional read, a one-pole wall
/// loss filter and per-round-trip decay.
///
/// An open tube reflects with positive sign and rings at every harmonic of
/// `f0`. A closed tube halves the loop and inverts the reflection, which leaves
/// the odd harmonics of the written pitch.

use std::f64::consts::PI;

use crate::params::ResonatorParams;

/// Lowest pitch the delay line can hold.
const MIN_TUBE_FREQ: f64 = 10.0;
const MAX_DECAY: f64 = 100.0;
/// Decay range covered by full velocity sensitivity.
const VELOCITY_SPAN: f64 = 1e4;
/// Loss scaling between the decay control and the per-round-trip gain.
const DECAY_SCALE: f64 = 125000.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Waveguide {
    sample_rate: f64,
    closed: bool,
    tube: Vec<f64>,
    write: usize,
    read: f64,
    base_freq: f64,
    tube_decay: f64,
    radius: f64,
    y1: f64,

    decay: f64,
    release: f64,
    vel_decay: f64,
}

impl Waveguide {
    pub fn new(sample_rate: f64) -> Self {
        let cap = (sample_rate / MIN_TUBE_FREQ).ceil() as usize + 4;
        Self {
            sample_rate,
            closed: false,
            tube: vec![0.0; cap.max(8)],
            write: 0,
            read: 0.0,
            base_freq: 0.0,
            tube_decay: 0.0,
            radius: 0.5,
            y1: 0.0,
            decay: 1.0,
            release: 1.0,
            vel_decay: 0.0,
        }
    }

    pub fn configure(&mut self, p: &ResonatorParams, closed: bool) {
        self.decay = p.decay;
        self.release = p.release;
        self.vel_decay = p.vel_decay;
        self.radius = p.radius.clamp(0.0, 1.0);
        self.closed = closed;
    }

    pub fn update(&mut self, freq: f64, vel: f64, is_release: bool, pitch_bend: f64) {
        self.base_freq = freq.max(MIN_TUBE_FREQ);
        self.apply_pitch_bend(pitch_bend);

        let mut decay_k = if self.decay > 0.0 {
            (self.decay.ln() + vel * self.vel_decay * VELOCITY_SPAN.ln())
                .exp()
                .min(MAX_DECAY)
        } else {
            0.0
        };
        if is_release {
            decay_k *= self.release;
        }
        self.tube_decay = if decay_k > 0.0 {
            (-PI / self.base_freq / (self.sample_rate * decay_k / DECAY_SCALE)).exp()
        } else {
            0.0
        };
    }

    /// Move the read pointer for a new bend without touching the loss.
    pub fn apply_pitch_bend(&mut self, pitch_bend: f64) {
        let cap = self.tube.len();
        let mut len = self.sample_rate / (self.base_freq * pitch_bend).max(MIN_TUBE_FREQ);
        if self.closed {
            len *= 0.5;
        }
        let len = len.clamp(2.0, (cap - 2) as f64);
        self.read = (self.write as f64 - len).rem_euclid(cap as f64);
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let cap = self.tube.len();
        let i = self.read as usize % cap;
        let frac = self.read - self.read.floor();
        let s0 = self.tube[i];
        let s1 = self.tube[(i + 1) % cap];
        let s = s0 + (s1 - s0) * frac;

        let y = self.radius * s + (1.0 - self.radius) * self.y1;
        self.y1 = y;

        let mut d = y * self.tube_decay;
        if self.closed {
            d = -d;
        }
        self.tube[self.write] = x + d;

        self.write = (self.write + 1) % cap;
        self.read += 1.0;
        if self.read >= cap as f64 {
            self.read -= cap as f64;
        }
        d
    }

    pub fn clear(&mut self) {
        self.tube.fill(0.0);
        self.y1 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Magnitude of one DFT bin at `freq`.
    fn dft_mag(buf: &[f64], freq: f64, sr: f64) -> f64 {
        let (mut re, mut im) = (0.0, 0.0);
        for (n, x) in buf.iter().enumerate() {
            let w = 2.0 * PI * freq * n as f64 / sr;
            re += x * w.cos();
            im -= x * w.sin();
        }
        (re * re + im * im).sqrt()
    }

    fn ring(closed: bool, freq: f64, sr: f64) -> Vec<f64> {
        let params = ResonatorParams {
            radius: 1.0,
            decay: 5.0,
            ..ResonatorParams::default()
        };
        let mut wg = Waveguide::new(sr);
        wg.configure(&params, closed);
        wg.update(freq, 0.0, false, 1.0);
        let mut out = Vec::with_capacity(sr as usize / 2);
        out.push(wg.process(1.0));
        for _ in 1..(sr as usize / 2) {
            out.push(wg.process(0.0));
        }
        out
    }

    #[test]
    fn test_closed_tube_has_odd_harmonics() {
        let sr = 44100.0;
        // Half-loop of 50 samples: the loop period is 100 samples, so 441 Hz
        // with only odd multiples present
        let out = ring(true, 441.0, sr);
        let h1 = dft_mag(&out, 441.0, sr);
        let h2 = dft_mag(&out, 882.0, sr);
        let h3 = dft_mag(&out, 1323.0, sr);
        assert!(h1 > 0.0 && h3 > 0.0);
        assert!(h2 / h1 < 0.1, "h2/h1 = {}", h2 / h1);
        assert!(h2 / h3 < 0.1, "h2/h3 = {}", h2 / h3);
    }

    #[test]
    fn test_open_tube_rings_at_fundamental() {
        let sr = 44100.0;
        let out = ring(false, 441.0, sr);
        let h1 = dft_mag(&out, 441.0, sr);
        let off = dft_mag(&out, 661.5, sr);
        assert!(h1 > off * 10.0, "h1 {h1} off {off}");
    }

    #[test]
    fn test_zero_decay_is_silent() {
        let params = ResonatorParams {
            decay: 0.0,
            ..ResonatorParams::default()
        };
        let mut wg = Waveguide::new(48000.0);
        wg.configure(&params, false);
        wg.update(200.0, 0.0, false, 1.0);
        assert_eq!(wg.tube_decay, 0.0);
        assert_eq!(wg.process(1.0), 0.0);
        for _ in 0..1000 {
            assert_eq!(wg.process(0.0), 0.0);
        }
    }

    #[test]
    fn test_release_decays_faster() {
        let params = ResonatorParams {
            release: 0.1,
            ..ResonatorParams::default()
        };
        let mut wg = Waveguide::new(48000.0);
        wg.configure(&params, false);
        wg.update(200.0, 0.0, false, 1.0);
        let held = wg.tube_decay;
        wg.update(200.0, 0.0, true, 1.0);
        assert!(wg.tube_decay < held);
    }

    #[test]
    fn test_low_pitch_fits_in_buffer() {
        let mut wg = Waveguide::new(48000.0);
        wg.configure(&ResonatorParams::default(), false);
        wg.update(1.0, 0.5, false, 0.25);
        for _ in 0..10000 {
            assert!(wg.process(0.1).is_finite());
        }
    }
}
