/// Sampled function table with linear and cubic lookup.
///
/// Used to cache `-2cos(2πf/sr)` across the audible band so continuous pitch
/// bend can retune every partial without a `cos()` per partial per sample.

use std::f64::consts::PI;

use crate::error::Error;

/// Points in the pitch-bend coefficient table.
pub const A1_TABLE_SIZE: usize = 4096;

#[derive(Clone, Debug, PartialEq)]
pub struct LookupTable {
    min: f64,
    max: f64,
    step: f64,
    values: Vec<f64>,
}

impl LookupTable {
    /// Sample `f` at `size` evenly spaced points over `[min, max]`.
    pub fn new(f: impl Fn(f64) -> f64, min: f64, max: f64, size: usize) -> Result<Self, Error> {
        if size < 2 || !min.is_finite() || !max.is_finite() || max <= min {
            return Err(Error::InvalidTableRange { min, max, size });
        }
        let step = (max - min) / (size - 1) as f64;
        let values = (0..size).map(|i| f(min + step * i as f64)).collect();
        Ok(Self { min, max, step, values })
    }

    /// Table of the biquad `a1` coefficient for a resonant peak at `f` Hz.
    pub fn biquad_a1(sample_rate: f64) -> Result<Self, Error> {
        Self::new(
            |f| -2.0 * (2.0 * PI * f / sample_rate).cos(),
            20.0,
            20000.0,
            A1_TABLE_SIZE,
        )
    }

    /// Split `x` into a table index and fraction, clamping to the domain.
    #[inline]
    fn locate(&self, x: f64) -> (usize, f64) {
        let pos = ((x.clamp(self.min, self.max) - self.min) / self.step).max(0.0);
        let last = self.values.len() - 1;
        let i = (pos as usize).min(last - 1);
        (i, pos - i as f64)
    }

    #[inline]
    pub fn linear(&self, x: f64) -> f64 {
        let (i, frac) = self.locate(x);
        let y0 = self.values[i];
        let y1 = self.values[i + 1];
        y0 + (y1 - y0) * frac
    }

    /// Catmull-Rom lookup, edge points repeated at the domain ends.
    #[inline]
    pub fn cubic(&self, x: f64) -> f64 {
        let (i, t) = self.locate(x);
        let last = self.values.len() - 1;
        let y0 = self.values[i.saturating_sub(1)];
        let y1 = self.values[i];
        let y2 = self.values[i + 1];
        let y3 = self.values[(i + 2).min(last)];
        catmull_rom(y0, y1, y2, y3, t)
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// Catmull-Rom spline through `y1..y2` at fraction `t`.
#[inline]
pub fn catmull_rom(y0: f64, y1: f64, y2: f64, y3: f64, t: f64) -> f64 {
    let a = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
    let b = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let c = -0.5 * y0 + 0.5 * y2;
    ((a * t + b) * t + c) * t + y1
}
