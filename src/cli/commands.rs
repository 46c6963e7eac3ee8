//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::thread;

use log::{info, warn};
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::effects::Effects;
use crate::engine::ContainerFormat;
use crate::error::{LofiError, Result};
use crate::jobs::JobTracker;
use crate::pipeline::{is_rendered_output, Pipeline};
use crate::probe::probe_duration;

/// Render one file and print where it went.
pub fn transform(
    config: PipelineConfig,
    input: &Path,
    effects: &Effects,
    report: bool,
) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let result = pipeline.transform_with_report(input, effects)?;

    if report {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.output_path.display());
    }

    Ok(())
}

/// Print a file's duration in whole seconds.
pub fn probe(path: &Path) -> Result<()> {
    println!("{}", probe_duration(path));
    Ok(())
}

/// Print the normalized engine values as JSON.
pub fn normalize(effects: &Effects) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&effects.normalize())?);
    Ok(())
}

/// Files under `dir` that look like source tracks
///
/// Skips hidden files (including in-progress `.partial` outputs) and
/// anything this tool already rendered.
pub fn collect_inputs(dir: &Path) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            !name.starts_with('.')
                && !is_rendered_output(path)
                && !matches!(ContainerFormat::from_path(path), ContainerFormat::Other(_))
        })
        .collect();
    inputs.sort();
    inputs
}

/// Transform every track under `dir` through the job tracker.
pub fn batch(config: PipelineConfig, dir: &Path, effects: &Effects) -> Result<()> {
    let inputs = collect_inputs(dir);
    if inputs.is_empty() {
        warn!("No audio files found under {}", dir.display());
        return Ok(());
    }

    info!("Transforming {} files from {}", inputs.len(), dir.display());

    let tracker = JobTracker::new(Pipeline::new(config)?);
    let workers = thread::available_parallelism().map_or(2, |n| n.get());
    let mut failed = 0usize;

    for chunk in inputs.chunks(workers) {
        let mut handles = Vec::with_capacity(chunk.len());
        for input in chunk {
            let track_id = input
                .strip_prefix(dir)
                .unwrap_or(input)
                .to_string_lossy()
                .into_owned();
            handles.push(tracker.submit(track_id, input, *effects)?);
        }

        for handle in handles {
            let track_id = handle.track_id().to_string();
            match handle.wait() {
                Ok(report) => println!("{} -> {}", track_id, report.output_path.display()),
                Err(e) => {
                    failed += 1;
                    println!("{} FAILED [{}]: {}", track_id, e.error_code(), e);
                }
            }
        }
    }

    if failed > 0 {
        return Err(LofiError::processing(
            "batch",
            format!("{} of {} files failed", failed, inputs.len()),
        ));
    }

    println!("Transformed {} files", inputs.len());
    Ok(())
}
