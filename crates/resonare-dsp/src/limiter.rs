// Copyright 2006, Thomas Scott Stillwell
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without modification, are permitted
// provided that the following conditions are met:
//
// Redistributions of source code must retain the above copyright notice, this list of conditions
// and the following disclaimer.
//
// Redistributions in binary form must reproduce the above copyright notice, this list of conditions
// and the following disclaimer in the documentation and/or other materials provided with the distribution.
//
// The name of Thomas Scott Stillwell may not be used to endorse or
// promote products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR
// IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND
// FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT OWNER OR CONTRIBUTORS
// BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES
// (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT,
// STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF
// THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

/// Program-dependent RMS limiter (after Thomas Scott Stillwell's "Fairly Childish").
///
/// The detector follows the louder of the two channels. Above threshold the
/// ratio rises from 1 toward 20 with the square root of the overshoot over
/// the knee ("bias"), giving a soft knee that hardens on loud peaks. The
/// output is then clamped to the ceiling (threshold × makeup) so fast
/// transients the RMS detector misses cannot overshoot.

/// 20 / ln(10)
const LOG2DB: f64 = 8.685_889_638_065_037;
/// ln(10) / 20
const DB2LOG: f64 = 0.115_129_254_649_702_28;
const RATIO: f64 = 20.0;
const ATTACK_S: f64 = 0.0002;
const RELEASE_S: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimiterSettings {
    pub threshold_db: f64,
    /// Knee width, percent.
    pub bias: f64,
    /// RMS window in microseconds.
    pub rms_window_us: f64,
    pub makeup_db: f64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            threshold_db: 0.0,
            bias: 70.0,
            rms_window_us: 100.0,
            makeup_db: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Limiter {
    thresh: f64,
    bias: f64,
    makeup: f64,
    ceiling: f64,
    attack_coef: f64,
    release_coef: f64,
    rms_coef: f64,
    run_avg: f64,
    run_db: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64, settings: &LimiterSettings) -> Self {
        let thresh = (settings.threshold_db * DB2LOG).exp();
        let makeup = (settings.makeup_db * DB2LOG).exp();
        let rms_s = settings.rms_window_us.max(1.0) / 1_000_000.0;
        Self {
            thresh,
            bias: 80.0 * settings.bias / 100.0,
            makeup,
            ceiling: thresh * makeup,
            attack_coef: (-1.0 / (ATTACK_S * sample_rate)).exp(),
            release_coef: (-1.0 / (RELEASE_S * sample_rate)).exp(),
            rms_coef: (-1.0 / (rms_s * sample_rate)).exp(),
            run_avg: 0.0,
            run_db: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, left: f64, right: f64) -> (f64, f64) {
        let peak = left.abs().max(right.abs());
        let sq = peak * peak;
        self.run_avg = sq + self.rms_coef * (self.run_avg - sq);
        let det = self.run_avg.max(0.0).sqrt();
        let over_db = if det > 0.0 {
            (LOG2DB * (det / self.thresh).ln()).max(0.0)
        } else {
            0.0
        };

        let coef = if over_db > self.run_db {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.run_db = over_db + coef * (self.run_db - over_db);
        let over_db = self.run_db.max(0.0);

        let ratio = if self.bias == 0.0 {
            RATIO
        } else {
            1.0 + (RATIO - 1.0) * (over_db / self.bias).sqrt()
        };
        let gr_db = -over_db * (ratio - 1.0) / ratio;
        let gain = (gr_db * DB2LOG).exp() * self.makeup;

        (
            (left * gain).clamp(-self.ceiling, self.ceiling),
            (right * gain).clamp(-self.ceiling, self.ceiling),
        )
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn reset(&mut self) {
        self.run_avg = 0.0;
        self.run_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    #[test]
    fn test_quiet_signal_passes_unchanged() {
        let mut lim = Limiter::new(SR, &LimiterSettings::default());
        for n in 0..4800 {
            let x = 0.25 * (n as f64 * 0.05).sin();
            let (l, r) = lim.process(x, -x);
            assert!((l - x).abs() < 1e-12);
            assert!((r + x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_loud_signal_never_exceeds_ceiling() {
        let mut lim = Limiter::new(SR, &LimiterSettings::default());
        let mut reduced = false;
        for n in 0..48000 {
            let x = 8.0 * (n as f64 * 0.03).sin();
            let (l, r) = lim.process(x, x * 0.5);
            assert!(l.abs() <= lim.ceiling() && r.abs() <= lim.ceiling());
            if n > 1000 && x.abs() > 4.0 && l.abs() < x.abs() * 0.5 {
                reduced = true;
            }
        }
        assert!(reduced);
    }

    #[test]
    fn test_louder_channel_drives_both() {
        let mut lim = Limiter::new(SR, &LimiterSettings::default());
        let mut last = (0.0, 0.0);
        for _ in 0..4800 {
            last = lim.process(0.1, 4.0);
        }
        // Right is over threshold, so left is reduced with it
        assert!(last.0 < 0.1 * 0.9, "left {}", last.0);
    }

    #[test]
    fn test_makeup_raises_ceiling() {
        let settings = LimiterSettings {
            makeup_db: 6.0,
            ..LimiterSettings::default()
        };
        let lim = Limiter::new(SR, &settings);
        assert!((lim.ceiling() - 1.995).abs() < 1e-3);
    }
}
