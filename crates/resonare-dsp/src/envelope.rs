//! Multi-stage amplitude envelope with per-stage tension shaping.
//!
//! Each stage is a one-pole recursion `level = b + level * c` whose coefficients
//! are solved so the stage lands on its target after exactly the configured
//! number of samples. Tension picks the curvature: above the linear point the
//! recursion diverges from a far pole (slow start, convex), below it the
//! recursion converges on an overshooting target (fast start, concave).

/// Envelope stage. Discriminants form the stage bitmask reported by `process`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    #[default]
    Off = 0,
    Attack = 1,
    Decay = 2,
    Sustain = 4,
    Release = 8,
}

impl Stage {
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Stage lengths and shapes. Times are in milliseconds, tensions in [-1, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeShape {
    pub attack_ms: f64,
    pub decay_ms: f64,
    /// Linear sustain level, 0..1 of the attack scale.
    pub sustain: f64,
    pub release_ms: f64,
    pub attack_tension: f64,
    pub decay_tension: f64,
    pub release_tension: f64,
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        Self {
            attack_ms: 1.0,
            decay_ms: 500.0,
            sustain: 0.0,
            release_ms: 100.0,
            attack_tension: 0.0,
            decay_tension: 0.0,
            release_tension: 0.0,
        }
    }
}

/// Map tension in [-1, 1] to the internal curvature value.
///
/// 0 maps to a very large value that makes the recursion near-linear, positive
/// tension maps into (1, 2] and negative into (0, 1].
fn normalize_tension(tension: f64) -> f64 {
    let t = tension.clamp(-1.0, 1.0) + 1.0;
    if t == 1.0 {
        100.0
    } else if t > 1.0 {
        3.001 - t
    } else {
        0.001 + t
    }
}

/// Solve `(b, c)` for a stage of `rate` samples covering `span`.
///
/// `slow_target` is used on the convex branch, `fast_target` on the concave
/// branch, `direction` is +1 for rising stages and -1 for falling stages.
fn stage_coefs(
    slow_target: f64,
    fast_target: f64,
    span: f64,
    rate: f64,
    tension: f64,
    direction: f64,
) -> (f64, f64) {
    if tension > 1.0 {
        let t = (tension - 1.0).powi(3);
        let c = (((span + t) / t).ln() / rate).exp();
        let b = (slow_target - direction * t) * (1.0 - c);
        (b, c)
    } else {
        let t = tension.powi(3);
        let c = (-((span + t) / t).ln() / rate).exp();
        let b = (fast_target + direction * t) * (1.0 - c);
        (b, c)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    level: f64,
    scale: f64,
    stage: Stage,
    attack_len: f64,
    decay_len: f64,
    release_len: f64,
    sustain: f64,
    attack_tension: f64,
    decay_tension: f64,
    release_tension: f64,
    ab: f64,
    ac: f64,
    db: f64,
    dc: f64,
    rb: f64,
    rc: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        let mut env = Self {
            level: 0.0,
            scale: 1.0,
            stage: Stage::Off,
            attack_len: 1.0,
            decay_len: 1.0,
            release_len: 1.0,
            sustain: 0.0,
            attack_tension: 100.0,
            decay_tension: 100.0,
            release_tension: 100.0,
            ab: 0.0,
            ac: 0.0,
            db: 0.0,
            dc: 0.0,
            rb: 0.0,
            rc: 0.0,
        };
        env.init(44100.0, &EnvelopeShape::default());
        env
    }
}

impl Envelope {
    /// Configure stage lengths (at least 1 ms and 1 sample each) and shapes.
    pub fn init(&mut self, sample_rate: f64, shape: &EnvelopeShape) {
        let samples = |ms: f64| (ms.max(1.0) * 0.001 * sample_rate).max(1.0);
        self.attack_len = samples(shape.attack_ms);
        self.decay_len = samples(shape.decay_ms);
        self.release_len = samples(shape.release_ms);
        self.sustain = shape.sustain.clamp(0.0, 1.0);
        self.attack_tension = normalize_tension(shape.attack_tension);
        self.decay_tension = normalize_tension(-shape.decay_tension);
        self.release_tension = normalize_tension(-shape.release_tension);
    }

    fn recalc_coefs(&mut self) {
        let s = self.scale;
        (self.ab, self.ac) = stage_coefs(0.0, s, s, self.attack_len, self.attack_tension, 1.0);
        (self.db, self.dc) = stage_coefs(
            s,
            self.sustain * s,
            (1.0 - self.sustain) * s,
            self.decay_len,
            self.decay_tension,
            -1.0,
        );
    }

    /// Start the attack stage from the current level towards `scale`.
    pub fn attack(&mut self, scale: f64) {
        self.scale = scale.max(0.0);
        self.recalc_coefs();
        self.stage = Stage::Attack;
        if self.level >= self.scale {
            self.enter_decay();
        }
    }

    fn enter_decay(&mut self) {
        self.level = self.scale;
        self.stage = Stage::Decay;
    }

    fn enter_sustain(&mut self) {
        self.level = self.scale * self.sustain;
        self.stage = Stage::Sustain;
    }

    /// Fall from the current level to zero over the release time.
    pub fn release(&mut self) {
        if self.stage == Stage::Off {
            return;
        }
        let from = self.level;
        if from <= f64::EPSILON {
            self.reset();
            return;
        }
        (self.rb, self.rc) = stage_coefs(from, 0.0, from, self.release_len, self.release_tension, -1.0);
        self.stage = Stage::Release;
    }

    pub fn reset(&mut self) {
        self.stage = Stage::Off;
        self.level = 0.0;
    }

    /// Advance one sample and report the stage that results.
    #[inline]
    pub fn process(&mut self) -> Stage {
        match self.stage {
            Stage::Off | Stage::Sustain => {}
            Stage::Attack => {
                self.level = self.ab + self.level * self.ac;
                if self.level >= self.scale {
                    self.enter_decay();
                }
            }
            Stage::Decay => {
                self.level = self.db + self.level * self.dc;
                if self.level <= self.sustain * self.scale {
                    self.enter_sustain();
                }
            }
            Stage::Release => {
                self.level = self.rb + self.level * self.rc;
                if self.level <= 0.0 {
                    self.reset();
                }
            }
        }
        self.stage
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_off(&self) -> bool {
        self.stage == Stage::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    fn shape(tension: f64) -> EnvelopeShape {
        EnvelopeShape {
            attack_ms: 10.0,
            decay_ms: 50.0,
            sustain: 0.5,
            release_ms: 40.0,
            attack_tension: tension,
            decay_tension: tension,
            release_tension: tension,
        }
    }

    #[test]
    fn test_stage_bits() {
        assert_eq!(Stage::Off.bits(), 0);
        assert_eq!(Stage::Attack.bits(), 1);
        assert_eq!(Stage::Decay.bits(), 2);
        assert_eq!(Stage::Sustain.bits(), 4);
        assert_eq!(Stage::Release.bits(), 8);
    }

    #[test]
    fn test_stages_are_monotonic_for_all_tensions() {
        for tension in [-1.0, -0.6, -0.2, 0.0, 0.3, 0.7, 1.0] {
            let mut env = Envelope::default();
            env.init(SR, &shape(tension));
            env.attack(1.0);

            let mut prev = env.level();
            let mut stage = env.stage();
            let mut saw_decay = false;
            for _ in 0..(SR as usize) {
                let next = env.process();
                let level = env.level();
                match stage {
                    Stage::Attack if next == Stage::Attack => {
                        assert!(level >= prev, "attack fell at tension {tension}")
                    }
                    Stage::Decay if next == Stage::Decay => {
                        assert!(level <= prev, "decay rose at tension {tension}")
                    }
                    _ => {}
                }
                assert!(level >= 0.0 && level <= 1.0 + 1e-9, "level {level} out of scale");
                saw_decay |= next == Stage::Decay;
                prev = level;
                stage = next;
            }
            assert!(saw_decay, "never reached decay at tension {tension}");
            assert_eq!(stage, Stage::Sustain, "tension {tension}");
            assert!((env.level() - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_attack_lands_on_configured_length() {
        for tension in [-0.5, 0.0, 0.5] {
            let mut env = Envelope::default();
            env.init(SR, &shape(tension));
            env.attack(1.0);
            let expected = (0.010 * SR) as i64;
            let mut n = 0i64;
            while env.process() == Stage::Attack {
                n += 1;
            }
            assert!((n - expected).abs() <= 2, "attack took {n} samples, expected {expected}");
        }
    }

    #[test]
    fn test_release_reaches_off() {
        for tension in [-1.0, 0.0, 1.0] {
            let mut env = Envelope::default();
            env.init(SR, &shape(tension));
            env.attack(1.0);
            for _ in 0..2000 {
                env.process();
            }
            env.release();
            assert_eq!(env.stage(), Stage::Release);

            let mut prev = env.level();
            let mut samples = 0;
            while env.process() != Stage::Off {
                assert!(env.level() <= prev);
                prev = env.level();
                samples += 1;
                assert!(samples < SR as usize, "release never finished");
            }
            assert_eq!(env.level(), 0.0);
        }
    }

    #[test]
    fn test_release_during_attack_starts_from_current_level() {
        let mut env = Envelope::default();
        env.init(SR, &shape(0.0));
        env.attack(1.0);
        for _ in 0..100 {
            env.process();
        }
        let level = env.level();
        env.release();
        env.process();
        assert!(env.level() < level);
    }

    #[test]
    fn test_zero_length_stages_clamp_to_one_sample() {
        let mut env = Envelope::default();
        env.init(
            SR,
            &EnvelopeShape {
                attack_ms: 0.0,
                decay_ms: -5.0,
                sustain: 1.0,
                release_ms: 0.0,
                ..EnvelopeShape::default()
            },
        );
        env.attack(1.0);
        let mut steps = 0;
        while env.process() != Stage::Sustain {
            steps += 1;
            assert!(steps < 200, "stuck in stage {:?}", env.stage());
        }
        assert!((env.level() - 1.0).abs() < 1e-9);
    }
}
