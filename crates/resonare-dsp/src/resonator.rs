/// One resonating body: a bank of modal partials or a tube waveguide, plus a
/// bipolar output "cut" filter.
///
/// Both bodies are allocated up front so switching models never allocates.
/// A resonator goes idle after one second of output and input below -100 dB.

use crate::filters::Biquad;
use crate::lookup::LookupTable;
use crate::models::{Model, Ratios, Topology, MAX_PARTIALS};
use crate::params::ResonatorParams;
use crate::partial::Partial;
use crate::tables::cut_to_freq;
use crate::waveguide::Waveguide;

const SILENCE_THRESHOLD: f64 = 1e-5;
const CUT_Q: f64 = 0.707;

#[derive(Clone, Debug, PartialEq)]
pub struct Resonator {
    sample_rate: f64,
    on: bool,
    model: Model,
    topology: Topology,
    partial_count: usize,
    partials: Vec<Partial>,
    waveguide: Waveguide,
    cut: Biquad,
    cut_enabled: bool,
    active: bool,
    silence: usize,
}

impl Resonator {
    pub fn new(sample_rate: f64) -> Self {
        let mut resonator = Self {
            sample_rate,
            on: false,
            model: Model::default(),
            topology: Topology::Modal,
            partial_count: MAX_PARTIALS,
            partials: (1..=MAX_PARTIALS).map(|k| Partial::new(k, sample_rate)).collect(),
            waveguide: Waveguide::new(sample_rate),
            cut: Biquad::default(),
            cut_enabled: false,
            active: false,
            silence: 0,
        };
        resonator.configure(&ResonatorParams::default());
        resonator
    }

    /// Apply shared controls to every partial, the waveguide and the cut filter.
    pub fn configure(&mut self, p: &ResonatorParams) {
        self.on = p.on;
        self.model = p.model;
        self.topology = p.model.topology();
        self.partial_count = p.partials.clamp(1, MAX_PARTIALS);

        for partial in &mut self.partials {
            partial.configure(self.sample_rate, p);
        }
        let closed = matches!(self.topology, Topology::Tube { closed: true });
        self.waveguide.configure(p, closed);

        let cut = p.cut.clamp(-1.0, 1.0);
        self.cut_enabled = cut != 0.0;
        let freq = cut_to_freq(cut);
        if cut < 0.0 {
            self.cut.set_lowpass(freq, CUT_Q, self.sample_rate);
        } else {
            self.cut.set_highpass(freq, CUT_Q, self.sample_rate);
        }
    }

    /// Retune every body from a ratio/gain table pair.
    ///
    /// Tubes use only `ratios[0]`, as a multiplier on `freq`.
    pub fn update(
        &mut self,
        freq: f64,
        vel: f64,
        is_release: bool,
        pitch_bend: f64,
        ratios: &Ratios,
        gains: &Ratios,
    ) {
        match self.topology {
            Topology::Modal => {
                let n = self.partial_count;
                let ratio_max = ratios[..n].iter().copied().fold(f64::MIN, f64::max);
                for (k, partial) in self.partials.iter_mut().enumerate().take(n) {
                    partial.update(freq, ratios[k], ratio_max, vel, pitch_bend, is_release, gains[k]);
                }
            }
            Topology::Tube { .. } => {
                self.waveguide.update(ratios[0] * freq, vel, is_release, pitch_bend);
            }
        }
    }

    /// Cheap retune for a changed bend; decay and gain are left alone.
    pub fn apply_pitch_bend(&mut self, bend: f64, a1_table: &LookupTable) {
        if !self.active {
            return;
        }
        match self.topology {
            Topology::Modal => {
                for partial in &mut self.partials[..self.partial_count] {
                    partial.apply_pitch_bend(bend, a1_table);
                }
            }
            Topology::Tube { .. } => self.waveguide.apply_pitch_bend(bend),
        }
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.silence = 0;
    }

    /// Resonate `input`, then the cut filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if !self.active {
            return 0.0;
        }
        let out = match self.topology {
            Topology::Modal => self.partials[..self.partial_count]
                .iter_mut()
                .map(|p| p.process(input))
                .sum(),
            Topology::Tube { .. } => self.waveguide.process(input),
        };

        if out.abs() + input.abs() > SILENCE_THRESHOLD {
            self.silence = 0;
        } else {
            self.silence += 1;
            if self.silence as f64 >= self.sample_rate {
                self.active = false;
            }
        }

        if self.cut_enabled { self.cut.process(out) } else { out }
    }

    /// Sum of the partials' matched sine oscillators. Tubes have none.
    #[inline]
    pub fn process_oscillators(&mut self) -> f64 {
        if !self.on {
            return 0.0;
        }
        match self.topology {
            Topology::Modal => self.partials[..self.partial_count]
                .iter_mut()
                .map(Partial::process_osc)
                .sum(),
            Topology::Tube { .. } => 0.0,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn partial_count(&self) -> usize {
        self.partial_count
    }

    /// Zero the filter and delay state.
    pub fn clear(&mut self) {
        for partial in &mut self.partials {
            partial.clear();
        }
        self.waveguide.clear();
        self.cut.clear(0.0);
    }

    /// Clear and stop processing until the next `activate`.
    pub fn deactivate(&mut self) {
        self.clear();
        self.active = false;
        self.silence = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelTable;

    const SR: f64 = 48000.0;

    fn resonator(p: &ResonatorParams) -> (Resonator, ModelTable) {
        let mut r = Resonator::new(SR);
        r.configure(p);
        r.activate();
        (r, ModelTable::new(p.ratio))
    }

    fn strike(r: &mut Resonator, table: &ModelTable, freq: f64) {
        let model = r.model();
        r.update(freq, 0.5, false, 1.0, &table.ratios_at(model, freq), table.gains(model));
        r.process(1.0);
    }

    #[test]
    fn test_modal_rings_after_impulse() {
        let (mut r, table) = resonator(&ResonatorParams::default());
        strike(&mut r, &table, 220.0);
        let energy: f64 = (0..4800).map(|_| r.process(0.0).powi(2)).sum();
        assert!(energy > 1e-6, "energy {energy}");
    }

    #[test]
    fn test_tube_rings_after_impulse() {
        let p = ResonatorParams {
            model: Model::OpenTube,
            ..ResonatorParams::default()
        };
        let (mut r, table) = resonator(&p);
        strike(&mut r, &table, 220.0);
        let energy: f64 = (0..4800).map(|_| r.process(0.0).powi(2)).sum();
        assert!(energy > 1e-6, "energy {energy}");
        assert_eq!(r.process_oscillators(), 0.0);
    }

    #[test]
    fn test_goes_idle_after_a_second_of_silence() {
        let p = ResonatorParams {
            decay: 0.01,
            ..ResonatorParams::default()
        };
        let (mut r, table) = resonator(&p);
        strike(&mut r, &table, 440.0);
        for _ in 0..(3 * SR as usize) {
            r.process(0.0);
        }
        assert!(!r.is_active());
        assert_eq!(r.process(1.0), 0.0);
    }

    #[test]
    fn test_partial_count_limits_bank() {
        let p = ResonatorParams {
            partials: 1,
            ..ResonatorParams::default()
        };
        let (mut one, table) = resonator(&p);
        strike(&mut one, &table, 110.0);
        assert_eq!(one.partial_count(), 1);
        // A single partial is a pure decaying sinusoid: zero crossings are evenly spaced
        let out: Vec<f64> = (0..4800).map(|_| one.process(0.0)).collect();
        let crossings = out.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
        assert!((crossings as i64 - 11).abs() <= 1, "{crossings}");
    }

    #[test]
    fn test_cut_lowpass_darkens_output() {
        let bright = ResonatorParams {
            partials: 64,
            ..ResonatorParams::default()
        };
        let dark = ResonatorParams { cut: -0.8, ..bright };
        let hf_energy = |p: &ResonatorParams| {
            let (mut r, table) = resonator(p);
            strike(&mut r, &table, 200.0);
            let out: Vec<f64> = (0..4800).map(|_| r.process(0.0)).collect();
            out.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f64>()
        };
        assert!(hf_energy(&bright) > hf_energy(&dark) * 4.0);
    }

    #[test]
    fn test_clear_keeps_resonator_silent() {
        let (mut r, table) = resonator(&ResonatorParams::default());
        strike(&mut r, &table, 330.0);
        r.deactivate();
        assert!(!r.is_active());
        r.activate();
        assert_eq!(r.process(0.0), 0.0);
    }
}
