/// Integration tests for the note renderer.
///
/// These run the binary end to end and check the WAV files it writes:
/// 1. Format and length follow the command line
/// 2. Batch mode names files by model, note and velocity
/// 3. Every model renders bounded, non-silent audio
/// 4. Renders are deterministic
/// 5. MIDI files are rendered on their own timeline
use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "note-renderer", "--"]);
    cmd
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(name)
}

#[test]
fn test_cli_renders_stereo_wav() {
    let output_path = temp_path("note_renderer_cli.wav");
    let _ = std::fs::remove_file(&output_path);

    let status = cargo_bin()
        .args(["-n", "60", "-v", "100", "-d", "0.5", "--hold", "0.2", "-o"])
        .arg(&output_path)
        .status()
        .expect("failed to run note-renderer");

    assert!(status.success(), "note-renderer exited with error");
    assert!(output_path.exists(), "WAV file not created");

    let reader = hound::WavReader::open(&output_path).expect("invalid WAV file");
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 48000);
    assert_eq!(reader.spec().bits_per_sample, 24);
    // hound counts samples across both channels
    assert_eq!(reader.len(), 2 * 24000);

    std::fs::remove_file(&output_path).ok();
}

#[test]
fn test_cli_batch_names() {
    let output_dir = temp_path("note_renderer_batch");
    std::fs::create_dir_all(&output_dir).unwrap();
    let status = cargo_bin()
        .args(["-n", "60,72", "-v", "90", "-d", "0.2", "--model", "marimba", "--output-dir"])
        .arg(&output_dir)
        .status()
        .expect("failed to run note-renderer");

    assert!(status.success());
    let c4 = output_dir.join("marimba_C4_v90.wav");
    let c5 = output_dir.join("marimba_C5_v90.wav");
    assert!(c4.exists());
    assert!(c5.exists());

    std::fs::remove_dir_all(&output_dir).ok();
}

#[test]
fn test_every_model_is_bounded_and_audible() {
    let models = [
        "string",
        "beam",
        "squared",
        "membrane",
        "plate",
        "drumhead",
        "marimba",
        "open tube",
        "closed tube",
        "marimba2",
        "bell",
        "djembe",
    ];
    for model in models {
        let path = temp_path(&format!("note_renderer_model_{}.wav", model.replace(' ', "_")));
        let _ = std::fs::remove_file(&path);
        let status = cargo_bin()
            .args(["-n", "57", "-d", "0.3", "--partials", "16", "--model", model, "-o"])
            .arg(&path)
            .status()
            .unwrap();
        assert!(status.success(), "{model} failed to render");

        let peak = wav_peak(&path);
        assert!(peak > 1e-4, "{model} is silent");
        assert!(peak <= 1.0, "{model} peak {peak}");
        std::fs::remove_file(&path).ok();
    }
}

#[test]
fn test_builtin_mallet_renders() {
    let path = temp_path("note_renderer_wood.wav");
    let _ = std::fs::remove_file(&path);
    let status = cargo_bin()
        .args(["-n", "64", "-d", "0.3", "--mallet", "wood", "-o"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(wav_peak(&path) > 1e-4);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_unknown_model_is_rejected() {
    let status = cargo_bin()
        .args(["--model", "kazoo", "-o"])
        .arg(temp_path("note_renderer_kazoo.wav"))
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn test_deterministic_output() {
    let path1 = temp_path("note_renderer_det_1.wav");
    let path2 = temp_path("note_renderer_det_2.wav");

    for path in [&path1, &path2] {
        let _ = std::fs::remove_file(path);
        let status = cargo_bin()
            .args(["-n", "60", "-v", "80", "-d", "0.3", "-o"])
            .arg(path)
            .status()
            .unwrap();
        assert!(status.success());
    }

    let samples1 = read_wav_samples(&path1);
    let samples2 = read_wav_samples(&path2);
    assert_eq!(
        samples1, samples2,
        "two renders of same note should be identical"
    );

    std::fs::remove_file(&path1).ok();
    std::fs::remove_file(&path2).ok();
}

#[test]
fn test_midi_file_render() {
    let midi_path = temp_path("note_renderer_phrase.mid");
    let wav_path = temp_path("note_renderer_phrase.wav");
    let _ = std::fs::remove_file(&wav_path);

    // Format 0, 96 ticks per quarter, 0.25 s per quarter; one quarter-note C4
    let smf: Vec<u8> = [
        b"MThd".as_slice(),
        &[0, 0, 0, 6, 0, 0, 0, 1, 0, 96],
        b"MTrk",
        &[0, 0, 0, 19],
        &[0x00, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90],
        &[0x00, 0x90, 60, 100],
        &[0x60, 0x80, 60, 0],
        &[0x00, 0xFF, 0x2F, 0x00],
    ]
    .concat();
    std::fs::write(&midi_path, smf).unwrap();

    let status = cargo_bin()
        .args(["-d", "0.25", "--midi"])
        .arg(&midi_path)
        .arg("-o")
        .arg(&wav_path)
        .status()
        .unwrap();
    assert!(status.success());

    let reader = hound::WavReader::open(&wav_path).expect("invalid WAV file");
    // 0.25 s of events plus the 0.25 s tail
    assert_eq!(reader.len(), 2 * 24000);
    assert!(wav_peak(&wav_path) > 1e-4);

    std::fs::remove_file(&midi_path).ok();
    std::fs::remove_file(&wav_path).ok();
}

fn wav_peak(path: &std::path::Path) -> f64 {
    let mut reader = hound::WavReader::open(path).expect("failed to open WAV");
    let max_val = (1i32 << (reader.spec().bits_per_sample - 1)) as f64;
    reader
        .samples::<i32>()
        .map(|s| (s.unwrap() as f64 / max_val).abs())
        .fold(0.0f64, f64::max)
}

fn read_wav_samples(path: &std::path::Path) -> Vec<i32> {
    let mut reader = hound::WavReader::open(path).expect("failed to open WAV");
    reader.samples::<i32>().map(|s| s.unwrap()).collect()
}
