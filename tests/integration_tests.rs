//! Integration Tests
//!
//! End-to-end tests for the lo-fi pipeline: real files in, real files out.

use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tempfile::TempDir;

use lofi::config::EncoderSettings;
use lofi::engine::{
    decode_audio, encode_audio, generate_stereo_test_tone, generate_test_tone, AudioBuffer,
    ContainerFormat, ExportFormat,
};
use lofi::{probe_duration, Effects, JobTracker, LofiError, Pipeline, PipelineConfig};

const SAMPLE_RATE: u32 = 22050;

/// Write a mono 16-bit tone to `dir/name`
fn write_tone(dir: &Path, name: &str, secs: f32) -> PathBuf {
    write_buffer(dir, name, &generate_test_tone(220.0, secs, SAMPLE_RATE), 16)
}

fn write_buffer(dir: &Path, name: &str, buffer: &AudioBuffer, bit_depth: u16) -> PathBuf {
    let path = dir.join(name);
    encode_audio(
        buffer,
        &path,
        &ContainerFormat::Wav,
        &ExportFormat::new(buffer.sample_rate, bit_depth),
        &EncoderSettings::default(),
    )
    .unwrap();
    path
}

fn seeded_pipeline(seed: u64) -> Pipeline {
    Pipeline::new(PipelineConfig {
        seed: Some(seed),
        ..PipelineConfig::default()
    })
    .unwrap()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn assert_within_percent(actual: f64, expected: f64, percent: f64) {
    let tolerance = expected * percent / 100.0;
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {:.2} +/- {:.2}, got {:.2}",
        expected,
        tolerance,
        actual
    );
}

// === Transform Scenarios ===

#[test]
fn test_effects_below_thresholds_keep_duration() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "quiet.wav", 4.0);

    let effects = Effects {
        vinyl_crackle: 5,
        reverb: 10,
        beat_slowdown: 0,
        bass_boost: 0,
        bit_crushing: 0,
        background_noise: 5,
    };
    let output = lofi::transform(&input, &effects).unwrap();

    assert!(output.exists());
    assert!(fs::metadata(&output).unwrap().len() > 0);
    let secs = probe_duration(&output) as i64;
    assert!((secs - 4).abs() <= 1, "duration {}", secs);
}

#[test]
fn test_full_slowdown_stretches_by_one_and_a_half() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "slow.wav", 6.0);

    let effects = Effects {
        beat_slowdown: 100,
        ..Effects::none()
    };
    let output = seeded_pipeline(1).transform(&input, &effects).unwrap();

    let expected = 6.0 / effects.normalize().beat_slowdown_ratio;
    assert_within_percent(probe_duration(&output) as f64, expected, 5.0);

    let decoded = decode_audio(&output).unwrap();
    assert_within_percent(decoded.buffer.duration_secs(), 9.0, 0.1);
}

#[test]
fn test_full_bit_crushing_quantizes_to_eight_bits() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "crush.wav", 1.0);

    let effects = Effects {
        bit_crushing: 100,
        ..Effects::none()
    };
    assert_eq!(effects.normalize().bit_depth, 8);

    let output = seeded_pipeline(1).transform(&input, &effects).unwrap();
    assert!(fs::metadata(&output).unwrap().len() > 0);

    // 16-bit output of a 0.5-amplitude tone on a 256-level grid
    let mut distinct: Vec<i16> = WavReader::open(&output)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect();
    distinct.sort_unstable();
    distinct.dedup();
    assert!(distinct.len() <= 130, "{} distinct levels", distinct.len());
}

#[test]
fn test_default_effects_scenario() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "song.wav", 11.0);

    let effects = Effects::default();
    let output = seeded_pipeline(7).transform(&input, &effects).unwrap();

    assert_ne!(output, input);
    assert!(fs::metadata(&output).unwrap().len() > 0);

    let expected = effects.normalize().stretched_duration(11.0);
    assert_within_percent(probe_duration(&output) as f64, expected, 5.0);

    let decoded = decode_audio(&output).unwrap();
    assert!(decoded.buffer.is_finite());
    assert!(decoded.buffer.peak() <= 0.99);
}

#[test]
fn test_missing_input_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("ghost.mp3");

    let err = seeded_pipeline(1)
        .transform(&input, &Effects::default())
        .unwrap_err();

    assert!(matches!(err, LofiError::InputNotAccessible { .. }));
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_input_file_is_untouched() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "keep.wav", 2.0);
    let before = fs::read(&input).unwrap();

    seeded_pipeline(1)
        .transform(&input, &Effects::default())
        .unwrap();

    assert_eq!(fs::read(&input).unwrap(), before);
    assert_eq!(dir_entries(dir.path()).len(), 2);
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "seeded.wav", 2.0);
    let pipeline = seeded_pipeline(1234);

    let first = pipeline
        .transform_with_report(&input, &Effects::default())
        .unwrap();
    let second = pipeline
        .transform_with_report(&input, &Effects::default())
        .unwrap();

    assert_ne!(first.output_path, second.output_path);
    assert_eq!(first.sha256, second.sha256);
    assert_eq!(
        fs::read(&first.output_path).unwrap(),
        fs::read(&second.output_path).unwrap()
    );
}

#[test]
fn test_different_seeds_differ() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "noisy.wav", 2.0);
    let effects = Effects {
        background_noise: 80,
        ..Effects::none()
    };

    let a = seeded_pipeline(1).transform_with_report(&input, &effects).unwrap();
    let b = seeded_pipeline(2).transform_with_report(&input, &effects).unwrap();
    assert_ne!(a.sha256, b.sha256);
}

#[test]
fn test_stereo_24_bit_source_keeps_format() {
    let dir = TempDir::new().unwrap();
    let tone = generate_stereo_test_tone(220.0, 330.0, 2.0, 44100);
    let input = write_buffer(dir.path(), "stereo.wav", &tone, 24);

    let output = seeded_pipeline(1)
        .transform(&input, &Effects::default())
        .unwrap();

    let spec = WavReader::open(&output).unwrap().spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.bits_per_sample, 24);
}

#[test]
fn test_output_dir_config() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "clip.wav", 1.0);
    let out_dir = dir.path().join("out");

    let pipeline = Pipeline::new(PipelineConfig {
        output_dir: Some(out_dir.clone()),
        ..PipelineConfig::default()
    })
    .unwrap();
    let output = pipeline.transform(&input, &Effects::default()).unwrap();

    assert!(output.starts_with(&out_dir));
    let name = output.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("clip_lofi_") && name.ends_with(".wav"));
    assert_eq!(dir_entries(&out_dir), vec![name]);
}

#[test]
fn test_mono_8_bit_source_is_accepted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("old.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 8,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).unwrap();
    for i in 0..16000 {
        let s = (100.0 * (i as f32 * 0.1).sin()) as i8;
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();

    let output = seeded_pipeline(1)
        .transform(&path, &Effects::default())
        .unwrap();
    assert!(probe_duration(&output) >= 2);
}

// === Duration Probing ===

#[test]
fn test_probe_missing_file_is_zero() {
    assert_eq!(probe_duration(Path::new("/definitely/not/here.wav")), 0);
}

#[test]
fn test_probe_valid_file_within_a_second() {
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path(), "five.wav", 5.0);
    let secs = probe_duration(&input) as i64;
    assert!((secs - 5).abs() <= 1);
}

#[test]
fn test_probe_undecodable_mp3_estimates_from_size() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.mp3");
    fs::write(&path, vec![0u8; 3_000_000]).unwrap();
    assert_eq!(probe_duration(&path), 188);
}

// === Normalization ===

#[test]
fn test_normalization_edges() {
    let full = Effects {
        vinyl_crackle: 100,
        ..Effects::none()
    }
    .normalize();
    assert_eq!(full.vinyl_crackle, 1.0);
    assert_eq!(full.bass_boost_db, 0.0);
    assert_eq!(full.bit_depth, 16);
}

// === Jobs ===

#[test]
fn test_job_tracker_rejects_duplicate_submit() {
    let dir = TempDir::new().unwrap();
    let tone = generate_stereo_test_tone(220.0, 330.0, 10.0, 44100);
    let input = write_buffer(dir.path(), "long.wav", &tone, 16);

    let tracker = JobTracker::new(seeded_pipeline(1));
    let first = tracker
        .submit("track-42", &input, Effects::default())
        .unwrap();

    let err = tracker
        .submit("track-42", &input, Effects::default())
        .unwrap_err();
    assert!(matches!(err, LofiError::TransformInFlight { .. }));

    // Other tracks are unaffected
    let other = tracker.submit("track-43", &input, Effects::none()).unwrap();

    let report = first.wait().unwrap();
    assert!(report.output_path.exists());
    other.wait().unwrap();

    // Once finished, the same track may be transformed again
    tracker
        .submit("track-42", &input, Effects::none())
        .unwrap()
        .wait()
        .unwrap();
}
