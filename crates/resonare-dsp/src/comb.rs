/// Stereoizer: a 20 ms single-tap delay added to one side and subtracted from the other.

const DELAY_MS: f64 = 20.0;
const TAP_GAIN: f64 = 0.33;

#[derive(Clone, Debug, PartialEq)]
pub struct Comb {
    buf: Vec<f64>,
    pos: usize,
}

impl Comb {
    pub fn new(sample_rate: f64) -> Self {
        let len = ((DELAY_MS * sample_rate / 1000.0) as usize).max(1);
        Self {
            buf: vec![0.0; len],
            pos: 0,
        }
    }

    /// Returns `(left, right)`.
    #[inline]
    pub fn process(&mut self, x: f64) -> (f64, f64) {
        let tap = self.buf[self.pos] * TAP_GAIN;
        self.buf[self.pos] = x;
        self.pos = (self.pos + 1) % self.buf.len();
        (x + tap, x - tap)
    }

    pub fn clear(&mut self) {
        self.buf.fill(0.0);
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_returns_after_delay() {
        let sr = 48000.0;
        let mut comb = Comb::new(sr);
        let delay = (DELAY_MS * sr / 1000.0) as usize;
        assert_eq!(comb.process(1.0), (1.0, 1.0));
        for _ in 1..delay {
            assert_eq!(comb.process(0.0), (0.0, 0.0));
        }
        let (l, r) = comb.process(0.0);
        assert!((l - TAP_GAIN).abs() < 1e-12);
        assert!((r + TAP_GAIN).abs() < 1e-12);
    }

    #[test]
    fn test_mid_is_preserved() {
        let mut comb = Comb::new(44100.0);
        for n in 0..5000 {
            let x = (n as f64 * 0.01).sin();
            let (l, r) = comb.process(x);
            assert!(((l + r) * 0.5 - x).abs() < 1e-12);
        }
    }
}
