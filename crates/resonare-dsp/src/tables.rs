/// Pitch, gain and control-range conversions shared across the engine.

/// Lowest and highest frequencies any resonant mode may be tuned to.
pub const MIN_FREQ: f64 = 20.0;
pub const MAX_FREQ: f64 = 20000.0;

/// Reference note for sample key tracking (C4).
pub const KEYTRACK_REFERENCE_NOTE: f64 = 60.0;

/// MIDI note number to fundamental frequency (Hz), A440 equal temperament.
pub fn midi_to_freq(midi: u8) -> f64 {
    440.0 * f64::powf(2.0, (midi as f64 - 69.0) / 12.0)
}

/// Semitone offset to frequency multiplier.
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    f64::powf(2.0, semitones / 12.0)
}

/// Map a 0..1 control to 20..20000 Hz on a log scale.
pub fn normal_to_freq(norm: f64) -> f64 {
    MIN_FREQ * (MAX_FREQ / MIN_FREQ).powf(norm.clamp(0.0, 1.0))
}

/// Inverse of [`normal_to_freq`].
pub fn freq_to_normal(freq: f64) -> f64 {
    ((freq.clamp(MIN_FREQ, MAX_FREQ) / MIN_FREQ).ln() / (MAX_FREQ / MIN_FREQ).ln()).clamp(0.0, 1.0)
}

/// Bipolar cut control in [-1, 1] to a filter frequency.
///
/// Negative values sweep a lowpass down from 20 kHz, positive values sweep a
/// highpass up from 20 Hz.
pub fn cut_to_freq(cut: f64) -> f64 {
    if cut < 0.0 {
        normal_to_freq(1.0 + cut)
    } else {
        normal_to_freq(cut)
    }
}

pub fn db_to_gain(db: f64) -> f64 {
    f64::powf(10.0, db / 20.0)
}

pub fn gain_to_db(gain: f64) -> f64 {
    20.0 * gain.max(1e-12).log10()
}

/// Velocity-modulate `base` on a log scale between `lo` and `hi`.
///
/// `base * (hi/lo)^(vel * amount)`, clamped to `[lo, hi]`. Used for every
/// frequency and time control that has a velocity sensitivity.
pub fn log_velocity(base: f64, vel: f64, amount: f64, lo: f64, hi: f64) -> f64 {
    (base.max(lo).ln() + vel * amount * (hi.ln() - lo.ln()))
        .exp()
        .clamp(lo, hi)
}

/// Velocity-modulate a 0..1 control in the skewed domain a host slider shows it in.
pub fn skewed_velocity(value: f64, vel: f64, amount: f64, skew: f64) -> f64 {
    let shown = value.clamp(0.0, 1.0).powf(skew);
    (shown + vel * amount).clamp(0.0, 1.0).powf(1.0 / skew)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_to_freq() {
        assert!((midi_to_freq(69) - 440.0).abs() < 1e-9);
        assert!((midi_to_freq(81) - 880.0).abs() < 1e-9);
        assert!((midi_to_freq(60) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_normal_freq_round_trip() {
        assert!((normal_to_freq(0.0) - 20.0).abs() < 1e-9);
        assert!((normal_to_freq(1.0) - 20000.0).abs() < 1e-6);
        for f in [20.0, 100.0, 1234.5, 20000.0] {
            assert!((normal_to_freq(freq_to_normal(f)) - f).abs() / f < 1e-9);
        }
    }

    #[test]
    fn test_cut_is_bipolar() {
        assert!((cut_to_freq(-1.0) - 20.0).abs() < 1e-9);
        assert!((cut_to_freq(-0.5) - cut_to_freq(0.5)).abs() < 1e-9);
        assert!((cut_to_freq(1.0) - 20000.0).abs() < 1e-6);
    }

    #[test]
    fn test_db_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_gain(-6.0206) - 0.5).abs() < 1e-4);
        assert!((gain_to_db(db_to_gain(-17.0)) + 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_log_velocity_endpoints() {
        // No sensitivity leaves the base untouched
        assert!((log_velocity(600.0, 1.0, 0.0, 100.0, 5000.0) - 600.0).abs() < 1e-9);
        // Full sensitivity at full velocity saturates
        assert_eq!(log_velocity(600.0, 1.0, 1.0, 100.0, 5000.0), 5000.0);
        assert_eq!(log_velocity(600.0, 1.0, -1.0, 100.0, 5000.0), 100.0);
    }

    #[test]
    fn test_skewed_velocity_identity_without_amount() {
        for v in [0.0, 0.1, 0.5, 1.0] {
            assert!((skewed_velocity(v, 1.0, 0.0, 0.3) - v).abs() < 1e-12);
        }
        assert_eq!(skewed_velocity(0.2, 1.0, 1.0, 0.3), 1.0);
    }
}
