//! Duration probing
//!
//! `probe_duration` reads the real frame count when it can and falls back
//! to a size-over-bitrate estimate when it cannot. It never fails: a file
//! that is missing or empty simply has no duration.

use std::fs::{self, File};
use std::path::Path;

use hound::WavReader;
use log::{debug, warn};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::ContainerFormat;
use crate::error::{LofiError, Result};

/// Assumed bitrate in bits per second when the real duration is unknown
pub fn assumed_bitrate_bps(container: &ContainerFormat) -> u64 {
    match container {
        ContainerFormat::Mp3 => 128_000,
        ContainerFormat::Wav => 1_411_200,
        ContainerFormat::Ogg => 160_000,
        ContainerFormat::Flac => 900_000,
        ContainerFormat::Other(_) => 128_000,
    }
}

/// Estimate whole seconds from the file size alone
///
/// Rounded to the nearest second, never below one for a non-empty file.
pub fn estimate_duration(size_bytes: u64, container: &ContainerFormat) -> u64 {
    if size_bytes == 0 {
        return 0;
    }
    let secs = (size_bytes as f64 * 8.0) / assumed_bitrate_bps(container) as f64;
    (secs.round() as u64).max(1)
}

/// Duration of an audio file in whole seconds
///
/// Returns 0 for a missing or zero-length file.
pub fn probe_duration(path: &Path) -> u64 {
    let size = match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return 0,
    };
    if size == 0 {
        return 0;
    }

    match probe_precise(path) {
        Ok(secs) => (secs.round() as u64).max(1),
        Err(e) => {
            let container = ContainerFormat::from_path(path);
            let estimate = estimate_duration(size, &container);
            warn!("{}; estimating {}s from file size", e, estimate);
            estimate
        }
    }
}

/// Exact duration in seconds from the decoded stream's frame count
///
/// # Errors
/// `DurationProbeFailure` if the container cannot be parsed or reports no
/// audio frames.
pub fn probe_precise(path: &Path) -> Result<f64> {
    let failure = |reason: String| LofiError::DurationProbeFailure {
        path: path.to_path_buf(),
        reason,
    };

    let container = ContainerFormat::from_path(path);
    let (frames, sample_rate) = match container {
        ContainerFormat::Wav => wav_frames(path).map_err(failure)?,
        _ => symphonia_frames(path, &container).map_err(failure)?,
    };

    if frames == 0 || sample_rate == 0 {
        return Err(failure("no audio frames".to_string()));
    }

    let secs = frames as f64 / sample_rate as f64;
    debug!(
        "Probed {}: {} frames at {} Hz = {:.3}s",
        path.display(),
        frames,
        sample_rate,
        secs
    );
    Ok(secs)
}

fn wav_frames(path: &Path) -> std::result::Result<(u64, u32), String> {
    let reader = WavReader::open(path).map_err(|e| e.to_string())?;
    Ok((reader.duration() as u64, reader.spec().sample_rate))
}

fn symphonia_frames(
    path: &Path,
    container: &ContainerFormat,
) -> std::result::Result<(u64, u32), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    match container {
        ContainerFormat::Mp3 => hint.with_extension("mp3"),
        ContainerFormat::Ogg => hint.with_extension("ogg"),
        ContainerFormat::Flac => hint.with_extension("flac"),
        ContainerFormat::Wav => hint.with_extension("wav"),
        ContainerFormat::Other(ext) => hint.with_extension(ext),
    };

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("unrecognized audio: {}", e))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| "no default audio track".to_string())?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "unknown sample rate".to_string())?;

    if let Some(frames) = track.codec_params.n_frames {
        return Ok((frames, sample_rate));
    }

    // No frame count in the header: walk the packets
    let mut frames = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => frames += packet.dur,
            Ok(_) => {}
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(format!("failed to read packet: {}", e)),
        }
    }

    Ok((frames, sample_rate))
}
