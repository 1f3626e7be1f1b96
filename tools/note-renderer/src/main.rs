/// Note Renderer: offline WAV renderer for the mallet percussion engine.
///
/// Renders single notes (batch over notes x velocities) or a Standard MIDI
/// File through the full engine: voices, stereoizer and limiter.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use resonare_dsp::mallet::MalletKind;
use resonare_dsp::models::Model;
use resonare_dsp::params::{EngineParams, ResonatorParams};
use resonare_dsp::sampler::InternalSample;
use resonare_dsp::{Engine, MidiEvent, MidiEventKind};
use simple_logger::SimpleLogger;

const BLOCK_SIZE: usize = 512;
/// MIDI default tempo, microseconds per quarter note.
const DEFAULT_TEMPO: u32 = 500_000;

#[derive(Parser, Debug)]
#[command(name = "note-renderer", version)]
#[command(about = "Render mallet percussion notes or MIDI files to WAV")]
struct Cli {
    /// MIDI note(s) to render
    #[arg(short, long, value_delimiter = ',', default_value = "60")]
    note: Vec<u8>,

    /// Velocity(ies) to render, 1-127
    #[arg(short, long, value_delimiter = ',', default_value = "100")]
    velocity: Vec<u8>,

    /// Length in seconds; with --midi, the tail after the last event
    #[arg(short, long, default_value_t = 2.0)]
    duration: f64,

    /// Seconds before the note is released
    #[arg(long, default_value_t = 0.5)]
    hold: f64,

    /// Render a Standard MIDI File instead of single notes
    #[arg(long)]
    midi: Option<PathBuf>,

    /// Resonator model, e.g. "marimba" or "closed tube"
    #[arg(long, default_value = "string", value_parser = parse_model)]
    model: Model,

    /// Active partial count, 1-64
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u8).range(1..=64))]
    partials: u8,

    /// Mallet: impulse, user, or a built-in sample name
    #[arg(long, default_value = "impulse", value_parser = parse_mallet)]
    mallet: MalletKind,

    /// WAV file for the user mallet (implies --mallet user)
    #[arg(long)]
    sample: Option<PathBuf>,

    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Output WAV file (single render only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output directory for batch mode
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Debug logging
    #[arg(long)]
    verbose: bool,
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn parse_model(s: &str) -> Result<Model, String> {
    let wanted = squash(s);
    Model::ALL
        .into_iter()
        .find(|m| squash(m.name()) == wanted)
        .ok_or_else(|| format!("unknown model '{s}'"))
}

fn parse_mallet(s: &str) -> Result<MalletKind, String> {
    match squash(s).as_str() {
        "impulse" => Ok(MalletKind::Impulse),
        "user" | "userfile" => Ok(MalletKind::UserFile),
        wanted => InternalSample::ALL
            .into_iter()
            .find(|x| squash(x.name()) == wanted)
            .map(MalletKind::Internal)
            .ok_or_else(|| format!("unknown mallet '{s}'")),
    }
}

fn engine_params(cli: &Cli) -> EngineParams {
    let mut params = EngineParams {
        a: ResonatorParams {
            model: cli.model,
            partials: cli.partials as usize,
            ratio: cli.model.default_ratio(),
            ..ResonatorParams::default()
        },
        ..EngineParams::default()
    };
    params.mallet.kind = if cli.sample.is_some() {
        MalletKind::UserFile
    } else {
        cli.mallet
    };
    params
}

fn midi_note_name(midi: u8) -> String {
    let names = ["C", "Cs", "D", "Ds", "E", "F", "Fs", "G", "Gs", "A", "As", "B"];
    let octave = (midi / 12) as i32 - 1;
    let note = (midi % 12) as usize;
    format!("{}{}", names[note], octave)
}

// ── Event scheduling ────────────────────────────────────────────────────────

/// An engine event at an absolute sample position.
#[derive(Clone, Copy, Debug)]
struct Scheduled {
    at: u64,
    kind: MidiEventKind,
}

fn translate(message: MidiMessage) -> Option<MidiEventKind> {
    match message {
        MidiMessage::NoteOn { key, vel } => Some(MidiEventKind::NoteOn {
            note: key.as_int(),
            velocity: vel.as_int(),
        }),
        MidiMessage::NoteOff { key, .. } => Some(MidiEventKind::NoteOff { note: key.as_int() }),
        MidiMessage::Controller { controller, value } => match controller.as_int() {
            64 if value.as_int() >= 64 => Some(MidiEventKind::SustainPedalOn),
            64 => Some(MidiEventKind::SustainPedalOff),
            120 | 123 => Some(MidiEventKind::AllNotesOff),
            _ => None,
        },
        MidiMessage::PitchBend { bend } => Some(MidiEventKind::PitchWheel(bend.0.as_int())),
        _ => None,
    }
}

/// Flatten every track onto one timeline, following tempo changes.
fn schedule_smf(smf: &Smf, sample_rate: f64) -> Vec<Scheduled> {
    let mut ticked: Vec<(u64, usize, TrackEventKind)> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            ticked.push((tick, ticked.len(), event.kind));
        }
    }
    ticked.sort_by_key(|&(tick, order, _)| (tick, order));

    let mut tempo = DEFAULT_TEMPO;
    let mut seconds = 0.0f64;
    let mut last_tick = 0u64;
    let mut out = Vec::with_capacity(ticked.len());
    for (tick, _, kind) in ticked {
        let tick_seconds = match smf.header.timing {
            Timing::Metrical(tpq) => tempo as f64 * 1e-6 / tpq.as_int().max(1) as f64,
            Timing::Timecode(fps, sub) => 1.0 / (fps.as_f32() as f64 * sub.max(1) as f64),
        };
        seconds += (tick - last_tick) as f64 * tick_seconds;
        last_tick = tick;
        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => tempo = t.as_int(),
            TrackEventKind::Midi { message, .. } => {
                if let Some(kind) = translate(message) {
                    out.push(Scheduled {
                        at: (seconds * sample_rate).round() as u64,
                        kind,
                    });
                }
            }
            _ => {}
        }
    }
    out
}

fn schedule_note(note: u8, velocity: u8, hold: f64, sample_rate: f64) -> Vec<Scheduled> {
    vec![
        Scheduled {
            at: 0,
            kind: MidiEventKind::NoteOn { note, velocity },
        },
        Scheduled {
            at: (hold.max(0.0) * sample_rate).round() as u64,
            kind: MidiEventKind::NoteOff { note },
        },
    ]
}

// ── Rendering ───────────────────────────────────────────────────────────────

/// Run the engine for `frames` samples, feeding scheduled events block by block.
fn render(engine: &mut Engine, events: &[Scheduled], frames: u64) -> (Vec<f64>, Vec<f64>) {
    let mut left = vec![0.0f64; frames as usize];
    let mut right = vec![0.0f64; frames as usize];
    let mut next = 0;
    let mut start = 0usize;
    while start < left.len() {
        let end = (start + BLOCK_SIZE).min(left.len());
        while next < events.len() && events[next].at < end as u64 {
            let offset = events[next].at.saturating_sub(start as u64) as usize;
            if !engine.push_event(MidiEvent::new(offset, events[next].kind)) {
                debug!("event queue full, dropped {:?}", events[next].kind);
            }
            next += 1;
        }
        engine.process_block::<f64>(None, &mut left[start..end], &mut right[start..end]);
        start = end;
    }
    (left, right)
}

fn write_wav(path: &Path, left: &[f64], right: &[f64], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let scale = (1 << 23) as f64 - 1.0;
    for (&l, &r) in left.iter().zip(right) {
        writer.write_sample((l.clamp(-1.0, 1.0) * scale) as i32)?;
        writer.write_sample((r.clamp(-1.0, 1.0) * scale) as i32)?;
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize {}", path.display()))?;
    Ok(())
}

fn new_engine(cli: &Cli) -> Result<Engine> {
    let sr = cli.sample_rate as f64;
    let mut engine = Engine::new(sr, engine_params(cli)).context("engine setup failed")?;
    if let Some(path) = &cli.sample {
        engine
            .load_user_sample(path)
            .with_context(|| format!("failed to load mallet sample {}", path.display()))?;
    }
    Ok(engine)
}

fn report(path: &Path, left: &[f64], right: &[f64]) {
    let peak = left
        .iter()
        .chain(right)
        .map(|x| x.abs())
        .fold(0.0f64, f64::max);
    info!(
        "  Peak amplitude: {peak:.6} ({:.1} dBFS) → {}",
        20.0 * peak.max(1e-12).log10(),
        path.display()
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("failed to install logger")?;

    if cli.duration <= 0.0 {
        bail!("duration must be positive");
    }
    let sr = cli.sample_rate as f64;

    if let Some(midi_path) = &cli.midi {
        let bytes = std::fs::read(midi_path)
            .with_context(|| format!("failed to read {}", midi_path.display()))?;
        let smf = Smf::parse(&bytes)
            .with_context(|| format!("failed to parse {}", midi_path.display()))?;
        let events = schedule_smf(&smf, sr);
        let last = events.last().map_or(0, |e| e.at);
        let frames = last + (cli.duration * sr) as u64;
        info!(
            "Rendering {} ({} events, {:.2}s) with {}",
            midi_path.display(),
            events.len(),
            frames as f64 / sr,
            cli.model.name()
        );

        let output = cli.output.clone().unwrap_or_else(|| {
            let stem = midi_path
                .file_stem()
                .map_or_else(|| "render".into(), |s| s.to_string_lossy().into_owned());
            cli.output_dir.join(format!("{stem}.wav"))
        });
        let mut engine = new_engine(&cli)?;
        let (left, right) = render(&mut engine, &events, frames);
        write_wav(&output, &left, &right, cli.sample_rate)?;
        report(&output, &left, &right);
        return Ok(());
    }

    let single = cli.note.len() == 1 && cli.velocity.len() == 1;
    let frames = (cli.duration * sr) as u64;
    let model_tag = cli.model.name().replace(' ', "").to_lowercase();
    for &note in &cli.note {
        if note > 127 {
            bail!("MIDI note {note} out of range (0-127)");
        }
        for &vel in &cli.velocity {
            let name = midi_note_name(note);
            let output = match &cli.output {
                Some(path) if single => path.clone(),
                _ => cli
                    .output_dir
                    .join(format!("{model_tag}_{name}_v{vel}.wav")),
            };
            info!(
                "Rendering MIDI {note} ({name}) vel={vel} dur={}s hold={}s",
                cli.duration, cli.hold
            );

            let mut engine = new_engine(&cli)?;
            let events = schedule_note(note, vel, cli.hold, sr);
            let (left, right) = render(&mut engine, &events, frames);
            write_wav(&output, &left, &right, cli.sample_rate)?;
            report(&output, &left, &right);
        }
    }
    Ok(())
}
