// Resonare: mallet percussion synthesizer plugin (CLAP + VST3).

use nih_plug::prelude::*;
use resonare_dsp::{Engine, MidiEvent, MidiEventKind};
use std::num::NonZeroU32;
use std::sync::Arc;

mod params;
use params::ResonareParams;

const MAX_BLOCK_SIZE: usize = 8192;

const CC_SUSTAIN: u8 = 64;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

// ── Event translation ───────────────────────────────────────────────────────

/// Map a host note event onto the engine's MIDI vocabulary.
fn translate(event: &NoteEvent<()>) -> Option<MidiEventKind> {
    match *event {
        NoteEvent::NoteOn { note, velocity, .. } => Some(MidiEventKind::NoteOn {
            note,
            velocity: (velocity * 127.0).round().clamp(0.0, 127.0) as u8,
        }),
        NoteEvent::NoteOff { note, .. } => Some(MidiEventKind::NoteOff { note }),
        NoteEvent::MidiCC { cc, value, .. } => match cc {
            CC_SUSTAIN if value >= 0.5 => Some(MidiEventKind::SustainPedalOn),
            CC_SUSTAIN => Some(MidiEventKind::SustainPedalOff),
            CC_ALL_SOUND_OFF | CC_ALL_NOTES_OFF => Some(MidiEventKind::AllNotesOff),
            _ => None,
        },
        NoteEvent::MidiPitchBend { value, .. } => Some(MidiEventKind::PitchWheel(
            (value * 16383.0).round().clamp(0.0, 16383.0) as u16,
        )),
        _ => None,
    }
}

// ── Plugin ──────────────────────────────────────────────────────────────────

struct Resonare {
    params: Arc<ResonareParams>,

    /// Built in `initialize` once the sample rate is known.
    engine: Option<Engine>,

    // Pre-allocated sidechain downmix
    input_buf: Vec<f32>,
}

impl Default for Resonare {
    fn default() -> Self {
        Self {
            params: Arc::new(ResonareParams::default()),
            engine: None,
            input_buf: vec![0.0; MAX_BLOCK_SIZE],
        }
    }
}

impl Resonare {
    /// Mono sum of the sidechain input. False when the host gives us nothing.
    fn mix_sidechain(&mut self, aux: &AuxiliaryBuffers, len: usize) -> bool {
        let Some(input) = aux.inputs.first() else {
            return false;
        };
        let channels = input.as_slice_immutable();
        if channels.is_empty() || len > self.input_buf.len() {
            return false;
        }
        let scale = 1.0 / channels.len() as f32;
        let mono = &mut self.input_buf[..len];
        mono.fill(0.0);
        for channel in channels {
            for (m, s) in mono.iter_mut().zip(channel.iter()) {
                *m += *s * scale;
            }
        }
        true
    }
}

impl Plugin for Resonare {
    const NAME: &'static str = "Resonare";
    const VENDOR: &'static str = "Resonare";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: None,
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[new_nonzero_u32(2)],
            aux_output_ports: &[],
            names: PortNames {
                aux_inputs: &["Excitation"],
                ..PortNames::const_default()
            },
        },
        AudioIOLayout {
            main_input_channels: None,
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::MidiCCs;
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let sample_rate = buffer_config.sample_rate as f64;

        let mut engine = match Engine::new(sample_rate, self.params.snapshot()) {
            Ok(engine) => engine,
            Err(e) => {
                nih_error!("engine setup failed at {sample_rate} Hz: {e}");
                return false;
            }
        };

        let user_sample = self
            .params
            .user_sample
            .read()
            .map(|path| path.clone())
            .unwrap_or_default();
        if !user_sample.is_empty() {
            if let Err(e) = engine.load_user_sample(&user_sample) {
                nih_warn!("user sample {user_sample}: {e}; using built-in");
            }
        }
        self.engine = Some(engine);

        let max_samples = buffer_config.max_buffer_size as usize;
        if self.input_buf.len() < max_samples {
            self.input_buf.resize(max_samples, 0.0);
        }

        nih_log!("initialized at {sample_rate} Hz, max block {max_samples}");
        true
    }

    fn reset(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let num_samples = buffer.samples();
        let has_input = self.mix_sidechain(aux, num_samples);

        let Some(engine) = self.engine.as_mut() else {
            return ProcessStatus::Normal;
        };

        if self.params.take_dirty() {
            engine.set_params(&self.params.snapshot());
        }

        // Events carry their in-block offset; the engine dispatches them per sample
        while let Some(event) = context.next_event() {
            if let Some(kind) = translate(&event) {
                let offset = (event.timing() as usize).min(num_samples.saturating_sub(1));
                engine.push_event(MidiEvent::new(offset, kind));
            }
        }

        let input = has_input.then(|| &self.input_buf[..num_samples]);
        let channels = buffer.as_slice();
        if let [left, right, ..] = channels {
            engine.process_block::<f32>(input, left, right);
        }

        ProcessStatus::Normal
    }
}

impl ClapPlugin for Resonare {
    const CLAP_ID: &'static str = "com.resonare.mallet-synth";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Physical-modeling mallet percussion with modal and waveguide resonators");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::Instrument,
        ClapFeature::Synthesizer,
        ClapFeature::Stereo,
    ];
}

impl Vst3Plugin for Resonare {
    const VST3_CLASS_ID: [u8; 16] = *b"ResonareMalletSy";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Instrument, Vst3SubCategory::Synth];
}

nih_export_clap!(Resonare);
nih_export_vst3!(Resonare);
