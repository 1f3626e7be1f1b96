//! Modal frequency-ratio and gain tables for every resonator model.
//!
//! Ratios are relative to the played fundamental, 64 per model. Most tables
//! are fixed; Beam, Membrane and Plate follow the resonator's aspect ratio and
//! are rebuilt when it changes, and Djembe is derived per retune from the
//! fundamental itself (its body resonance is fixed in Hz).
//!
//! All rebuilds work in fixed stack buffers so they are safe to run from the
//! audio thread when a parameter snapshot arrives.

use std::f64::consts::PI;

use crate::error::Error;

pub const MAX_PARTIALS: usize = 64;
pub type Ratios = [f64; MAX_PARTIALS];

/// Free-free beam eigenvalues βL for the first modes; higher modes use (n + ½)π.
const FREE_BEAM_BETA: [f64; 5] = [
    4.730_040_744_862_704,
    7.853_204_624_095_838,
    10.995_607_838_001_671,
    14.137_165_491_257_464,
    17.278_759_657_399_480,
];

/// Measured church-bell partials (hum, prime, tierce, quint, nominal, ...).
const BELL_RATIOS: [f64; 12] = [
    0.5, 1.0, 1.183, 1.506, 2.0, 2.514, 2.662, 3.011, 4.166, 5.433, 6.796, 8.215,
];
const BELL_GAINS: [f64; 12] = [0.6, 1.0, 0.8, 0.5, 0.9, 0.5, 0.4, 0.35, 0.3, 0.25, 0.2, 0.15];

/// Djembe body (Helmholtz) resonance in Hz at aspect ratio 1.
const DJEMBE_BODY_HZ: f64 = 60.0;

/// Grid size for rectangular membrane and plate mode searches.
const GRID: usize = 32;
const BESSEL_ORDERS: usize = 25;
const BESSEL_MAX_X: f64 = 45.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Model {
    #[default]
    String,
    Beam,
    Squared,
    Membrane,
    Plate,
    Drumhead,
    Marimba,
    OpenTube,
    ClosedTube,
    Marimba2,
    Bell,
    Djembe,
}

/// Which resonator body a model runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Modal,
    Tube { closed: bool },
}

impl Model {
    pub const COUNT: usize = 12;
    pub const ALL: [Model; Model::COUNT] = [
        Model::String,
        Model::Beam,
        Model::Squared,
        Model::Membrane,
        Model::Plate,
        Model::Drumhead,
        Model::Marimba,
        Model::OpenTube,
        Model::ClosedTube,
        Model::Marimba2,
        Model::Bell,
        Model::Djembe,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Model::String => "String",
            Model::Beam => "Beam",
            Model::Squared => "Squared",
            Model::Membrane => "Membrane",
            Model::Plate => "Plate",
            Model::Drumhead => "Drumhead",
            Model::Marimba => "Marimba",
            Model::OpenTube => "Open Tube",
            Model::ClosedTube => "Closed Tube",
            Model::Marimba2 => "Marimba2",
            Model::Bell => "Bell",
            Model::Djembe => "Djembe",
        }
    }

    pub fn topology(self) -> Topology {
        match self {
            Model::OpenTube => Topology::Tube { closed: false },
            Model::ClosedTube => Topology::Tube { closed: true },
            _ => Topology::Modal,
        }
    }

    /// Aspect ratio a host should reset to when this model is selected.
    pub fn default_ratio(self) -> f64 {
        match self {
            Model::Beam => 2.0,
            Model::Djembe => 1.0,
            _ => 0.78,
        }
    }

    /// Whether the aspect-ratio control changes this model's spectrum.
    pub fn uses_ratio(self) -> bool {
        matches!(self, Model::Beam | Model::Membrane | Model::Plate | Model::Djembe)
    }
}

impl TryFrom<usize> for Model {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self, Error> {
        Model::ALL.get(index).copied().ok_or(Error::UnknownModel(index))
    }
}

/// Free-free beam mode ratios (βₙ/β₁)², the reference series for bars.
pub fn free_beam_ratios() -> Ratios {
    let beta1 = FREE_BEAM_BETA[0];
    std::array::from_fn(|n| {
        let beta = FREE_BEAM_BETA
            .get(n)
            .copied()
            .unwrap_or((n as f64 + 1.5) * PI);
        (beta / beta1).powi(2)
    })
}

/// Bessel function of the first kind, integer order, via Bessel's integral.
///
/// The integrand is even and 2π-periodic, so the trapezoid rule converges
/// spectrally; 64 panels are exact to double precision for `m + x < 100`.
pub fn bessel_j(m: usize, x: f64) -> f64 {
    const PANELS: usize = 64;
    let h = PI / PANELS as f64;
    let m = m as f64;
    let f = |tau: f64| (m * tau - x * tau.sin()).cos();
    let mut sum = 0.5 * (f(0.0) + f(PI));
    for k in 1..PANELS {
        sum += f(k as f64 * h);
    }
    sum * h / PI
}

/// Keep the `MAX_PARTIALS` smallest distinct values, normalized by the smallest.
fn smallest_normalized(candidates: &mut [f64]) -> Ratios {
    candidates.sort_unstable_by(|a, b| a.total_cmp(b));
    let mut out = [0.0; MAX_PARTIALS];
    let mut count = 0;
    let mut last = f64::NEG_INFINITY;
    for &c in candidates.iter() {
        if count == MAX_PARTIALS {
            break;
        }
        if c - last > 1e-9 * c.abs().max(1.0) {
            out[count] = c;
            last = c;
            count += 1;
        }
    }
    // Fewer distinct values than slots: continue the top spacing
    if count < MAX_PARTIALS {
        let step = if count > 1 { out[count - 1] - out[count - 2] } else { 1.0 };
        for i in count.max(1)..MAX_PARTIALS {
            out[i] = out[i - 1] + step.max(1e-3);
        }
    }
    let base = out[0];
    for r in &mut out {
        *r /= base;
    }
    out
}

/// Circular membrane mode ratios j(m,n) / j(0,1).
fn drumhead_ratios() -> Ratios {
    let mut zeros = [0.0f64; 512];
    let mut count = 0;
    let step = 0.2;
    for m in 0..BESSEL_ORDERS {
        let mut x0 = m as f64 + 0.5;
        let mut y0 = bessel_j(m, x0);
        while x0 < BESSEL_MAX_X && count < zeros.len() {
            let x1 = x0 + step;
            let y1 = bessel_j(m, x1);
            if y0 * y1 < 0.0 {
                let (mut lo, mut hi, mut ylo) = (x0, x1, y0);
                for _ in 0..60 {
                    let mid = 0.5 * (lo + hi);
                    let ymid = bessel_j(m, mid);
                    if ylo * ymid <= 0.0 {
                        hi = mid;
                    } else {
                        lo = mid;
                        ylo = ymid;
                    }
                }
                zeros[count] = 0.5 * (lo + hi);
                count += 1;
            }
            x0 = x1;
            y0 = y1;
        }
    }
    smallest_normalized(&mut zeros[..count])
}

/// Bending modes merged with torsional modes spaced by the width ratio.
fn beam_ratios(aspect: f64) -> Ratios {
    let bending = free_beam_ratios();
    let mut candidates = [0.0f64; 2 * MAX_PARTIALS];
    for i in 0..MAX_PARTIALS {
        candidates[i] = bending[i];
        candidates[MAX_PARTIALS + i] = 2.0 * aspect.max(0.01) * (i + 1) as f64;
    }
    smallest_normalized(&mut candidates)
}

/// Rectangular membrane: sqrt(m² + (a·n)²).
fn membrane_ratios(aspect: f64) -> Ratios {
    let a = aspect.max(0.01);
    let mut candidates = [0.0f64; GRID * GRID];
    for m in 0..GRID {
        for n in 0..GRID {
            let (mf, nf) = ((m + 1) as f64, (n + 1) as f64);
            candidates[m * GRID + n] = (mf * mf + a * a * nf * nf).sqrt();
        }
    }
    smallest_normalized(&mut candidates)
}

/// Simply supported rectangular plate: m² + (a·n)².
fn plate_ratios(aspect: f64) -> Ratios {
    let a = aspect.max(0.01);
    let mut candidates = [0.0f64; GRID * GRID];
    for m in 0..GRID {
        for n in 0..GRID {
            let (mf, nf) = ((m + 1) as f64, (n + 1) as f64);
            candidates[m * GRID + n] = mf * mf + a * a * nf * nf;
        }
    }
    smallest_normalized(&mut candidates)
}

/// Tuned bar: the first three modes are set by undercutting, the rest follow
/// the free beam scaled to stay above the third.
fn tuned_bar_ratios(tuning: [f64; 3]) -> Ratios {
    let beam = free_beam_ratios();
    let scale = tuning[2] / beam[2];
    std::array::from_fn(|i| if i < 3 { tuning[i] } else { beam[i] * scale })
}

fn static_ratios(model: Model, aspect: f64, drumhead: &Ratios) -> Ratios {
    match model {
        Model::String | Model::OpenTube => std::array::from_fn(|i| (i + 1) as f64),
        Model::ClosedTube => std::array::from_fn(|i| (2 * i + 1) as f64),
        Model::Beam => beam_ratios(aspect),
        Model::Squared => membrane_ratios(1.0),
        Model::Membrane => membrane_ratios(aspect),
        Model::Plate => plate_ratios(aspect),
        Model::Drumhead => *drumhead,
        Model::Marimba => tuned_bar_ratios([1.0, 3.99, 10.65]),
        Model::Marimba2 => tuned_bar_ratios([1.0, 3.0, 6.5]),
        Model::Bell => std::array::from_fn(|i| {
            BELL_RATIOS
                .get(i)
                .copied()
                .unwrap_or(BELL_RATIOS[11] + 1.45 * (i - 11) as f64)
        }),
        Model::Djembe => djembe_ratios(drumhead, 220.0, aspect),
    }
}

fn gain_profile(model: Model) -> Ratios {
    match model {
        Model::String | Model::Beam | Model::OpenTube | Model::ClosedTube => [1.0; MAX_PARTIALS],
        Model::Squared | Model::Membrane | Model::Plate | Model::Drumhead => {
            std::array::from_fn(|i| 1.0 / ((i + 1) as f64).sqrt())
        }
        Model::Marimba | Model::Marimba2 => std::array::from_fn(|i| 1.0 / (i + 1) as f64),
        Model::Bell => std::array::from_fn(|i| BELL_GAINS.get(i).copied().unwrap_or(0.1)),
        Model::Djembe => std::array::from_fn(|i| {
            if i == 0 { 1.2 } else { 1.0 / (i as f64).sqrt() }
        }),
    }
}

/// Djembe: body resonance at a fixed frequency plus the drumhead series.
fn djembe_ratios(drumhead: &Ratios, freq: f64, aspect: f64) -> Ratios {
    let body = DJEMBE_BODY_HZ * aspect.max(0.01) / freq.max(1.0);
    std::array::from_fn(|i| if i == 0 { body } else { drumhead[i - 1] })
}

/// Ratio and gain tables for one resonator.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelTable {
    ratios: [Ratios; Model::COUNT],
    gains: [Ratios; Model::COUNT],
    drumhead: Ratios,
    aspect: f64,
}

impl ModelTable {
    pub fn new(aspect: f64) -> Self {
        let drumhead = drumhead_ratios();
        Self {
            ratios: Model::ALL.map(|m| static_ratios(m, aspect, &drumhead)),
            gains: Model::ALL.map(gain_profile),
            drumhead,
            aspect,
        }
    }

    /// Rebuild the aspect-dependent tables. No-op if unchanged.
    pub fn set_aspect(&mut self, aspect: f64) {
        if aspect == self.aspect {
            return;
        }
        self.aspect = aspect;
        self.ratios[Model::Beam.index()] = beam_ratios(aspect);
        self.ratios[Model::Membrane.index()] = membrane_ratios(aspect);
        self.ratios[Model::Plate.index()] = plate_ratios(aspect);
    }

    pub fn aspect(&self) -> f64 {
        self.aspect
    }

    pub fn ratios(&self, model: Model) -> &Ratios {
        &self.ratios[model.index()]
    }

    pub fn gains(&self, model: Model) -> &Ratios {
        &self.gains[model.index()]
    }

    /// Ratios to use for `model` at fundamental `freq`.
    pub fn ratios_at(&self, model: Model, freq: f64) -> Ratios {
        match model {
            Model::Djembe => djembe_ratios(&self.drumhead, freq, self.aspect),
            _ => self.ratios[model.index()],
        }
    }
}

/// Tables for resonators A and B. Built once at prepare.
#[derive(Clone, Debug, PartialEq)]
pub struct Models {
    pub a: ModelTable,
    pub b: ModelTable,
}

impl Models {
    pub fn new(aspect_a: f64, aspect_b: f64) -> Self {
        let a = ModelTable::new(aspect_a);
        let mut b = a.clone();
        b.set_aspect(aspect_b);
        Self { a, b }
    }
}
