/// Second-order filter section shared by the exciters, partials and resonator cut filters.
///
/// All designs: `lowpass/bandpass/highpass(freq, q, sample_rate)`, `process(sample) -> sample`,
/// `clear(value)`. Frequencies at or past Nyquist and non-positive frequencies degrade to
/// pass-through or silence instead of producing NaN coefficients.

use std::f64::consts::PI;

/// Lowest Q accepted by the cookbook designs.
const MIN_Q: f64 = 1e-3;

/// Biquad filter, Direct Form I.
///
/// DF1 keeps the input history, so `clear(v)` can park the whole state on a
/// constant level without a step at the next sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Default for Biquad {
    /// Unity pass-through.
    fn default() -> Self {
        Self::from_coefs(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }
}

/// Band position of a design frequency relative to the usable range.
enum Band {
    Below,
    Inside(f64),
    Above,
}

fn band(freq: f64, sample_rate: f64) -> Band {
    let nyquist = sample_rate * 0.5;
    if freq.is_nan() || freq <= 0.0 {
        Band::Below
    } else if freq >= nyquist * 0.999 {
        Band::Above
    } else {
        Band::Inside(2.0 * PI * freq / sample_rate)
    }
}

impl Biquad {
    fn from_coefs(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn silent() -> Self {
        Self::from_coefs(0.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    /// Low-pass filter (Audio EQ Cookbook). Above Nyquist it passes everything.
    pub fn lowpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        match band(cutoff_hz, sample_rate) {
            Band::Below => Self::silent(),
            Band::Above => Self::default(),
            Band::Inside(w0) => {
                let alpha = w0.sin() / (2.0 * q.max(MIN_Q));
                let cos_w0 = w0.cos();
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                Self::from_coefs(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
        }
    }

    /// Bandpass filter (0 dB peak gain, Audio EQ Cookbook). Silent outside (0, Nyquist).
    pub fn bandpass(center_hz: f64, q: f64, sample_rate: f64) -> Self {
        match band(center_hz, sample_rate) {
            Band::Below | Band::Above => Self::silent(),
            Band::Inside(w0) => {
                let alpha = w0.sin() / (2.0 * q.max(MIN_Q));
                let cos_w0 = w0.cos();
                Self::from_coefs(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
        }
    }

    /// High-pass filter (Audio EQ Cookbook). At or below 0 Hz it passes everything.
    pub fn highpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        match band(cutoff_hz, sample_rate) {
            Band::Below => Self::default(),
            Band::Above => Self::silent(),
            Band::Inside(w0) => {
                let alpha = w0.sin() / (2.0 * q.max(MIN_Q));
                let cos_w0 = w0.cos();
                let b1 = -(1.0 + cos_w0);
                let b0 = -b1 / 2.0;
                Self::from_coefs(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
        }
    }

    fn take_coefs(&mut self, new: Self) {
        self.b0 = new.b0;
        self.b1 = new.b1;
        self.b2 = new.b2;
        self.a1 = new.a1;
        self.a2 = new.a2;
    }

    /// Update coefficients to lowpass without resetting filter state.
    pub fn set_lowpass(&mut self, cutoff_hz: f64, q: f64, sample_rate: f64) {
        self.take_coefs(Self::lowpass(cutoff_hz, q, sample_rate));
    }

    /// Update coefficients to bandpass without resetting filter state.
    pub fn set_bandpass(&mut self, center_hz: f64, q: f64, sample_rate: f64) {
        self.take_coefs(Self::bandpass(center_hz, q, sample_rate));
    }

    /// Update coefficients to highpass without resetting filter state.
    pub fn set_highpass(&mut self, cutoff_hz: f64, q: f64, sample_rate: f64) {
        self.take_coefs(Self::highpass(cutoff_hz, q, sample_rate));
    }

    /// Process one sample (Direct Form I).
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Park input and output history on `value`.
    pub fn clear(&mut self, value: f64) {
        self.x1 = value;
        self.x2 = value;
        self.y1 = value;
        self.y2 = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_peak(filter: &mut Biquad, freq: f64, sr: f64) -> f64 {
        let n = (sr * 0.1) as usize;
        let mut peak = 0.0f64;
        for i in 0..n {
            let x = (2.0 * PI * freq * i as f64 / sr).sin();
            let y = filter.process(x);
            if i > n / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_lowpass_passes_low_freq() {
        let sr = 44100.0;
        let mut lpf = Biquad::lowpass(5000.0, 0.707, sr);
        let peak = steady_peak(&mut lpf, 200.0, sr);
        assert!(peak > 0.9, "LPF attenuated 200Hz too much: {peak}");
    }

    #[test]
    fn test_lowpass_attenuates_high_freq() {
        let sr = 44100.0;
        let mut lpf = Biquad::lowpass(500.0, 0.707, sr);
        let peak = steady_peak(&mut lpf, 10000.0, sr);
        assert!(peak < 0.01, "LPF didn't attenuate 10kHz enough: {peak}");
    }

    #[test]
    fn test_highpass_attenuates_low_freq() {
        let sr = 44100.0;
        let mut hpf = Biquad::highpass(2000.0, 0.707, sr);
        let peak = steady_peak(&mut hpf, 100.0, sr);
        assert!(peak < 0.01, "HPF didn't attenuate 100Hz enough: {peak}");
    }

    #[test]
    fn test_bandpass() {
        let sr = 44100.0;
        let center = 1000.0;
        let mut bpf = Biquad::bandpass(center, 1.0, sr);
        let peak_center = steady_peak(&mut bpf, center, sr);
        bpf.clear(0.0);
        let peak_low = steady_peak(&mut bpf, 100.0, sr);

        assert!((peak_center - 1.0).abs() < 0.05, "BPF peak gain should be ~0 dB: {peak_center}");
        assert!(
            peak_center > peak_low * 3.0,
            "BPF center ({peak_center}) should be much louder than off-center ({peak_low})"
        );
    }

    #[test]
    fn test_out_of_range_designs_stay_finite() {
        let sr = 48000.0;
        for freq in [-10.0, 0.0, 24000.0, 30000.0, f64::NAN] {
            for mut f in [
                Biquad::lowpass(freq, 0.707, sr),
                Biquad::bandpass(freq, 0.707, sr),
                Biquad::highpass(freq, 0.707, sr),
            ] {
                for i in 0..256 {
                    let y = f.process(if i % 7 == 0 { 1.0 } else { -0.3 });
                    assert!(y.is_finite(), "freq {freq} produced {y}");
                }
            }
        }
        // Above Nyquist: lowpass is transparent, highpass and bandpass are silent
        let mut lp = Biquad::lowpass(30000.0, 0.707, sr);
        assert_eq!(lp.process(0.5), 0.5);
        let mut hp = Biquad::highpass(30000.0, 0.707, sr);
        assert_eq!(hp.process(0.5), 0.0);
    }

    #[test]
    fn test_clear_holds_constant_without_step() {
        let sr = 44100.0;
        let mut lpf = Biquad::lowpass(1000.0, 0.707, sr);
        lpf.clear(0.25);
        // DC gain of a lowpass is 1, so a parked state continues flat
        let y = lpf.process(0.25);
        assert!((y - 0.25).abs() < 1e-9, "step after clear: {y}");
    }
}
