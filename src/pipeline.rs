//! The lo-fi transformation pipeline
//!
//! `Pipeline::transform` decodes an input track, runs it through the
//! effect chain and writes the result to a fresh file next to the input
//! (or into the configured output directory). The input is never modified.
//!
//! Output is written to a hidden `.partial` file first and only renamed
//! into place once it is known to be non-empty, so a failed run leaves
//! nothing behind.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::dsp::EffectChain;
use crate::effects::{Effects, NormalizedEffects};
use crate::engine::buffer::linear_to_db;
use crate::engine::{decode_audio, encode_audio, ContainerFormat, ExportFormat, OUTPUT_CEILING};
use crate::error::{LofiError, Result};
use crate::probe::probe_duration;

/// Everything known about a finished transformation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformReport {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Output size in bytes
    pub bytes: u64,
    /// Hex SHA-256 of the output file
    pub sha256: String,
    /// Probed output duration in whole seconds
    pub duration_secs: u64,
    /// Stages that ran, in order; empty for a byte copy
    pub stages: Vec<String>,
    /// Seed used for noise synthesis
    pub seed: u64,
    pub effects: NormalizedEffects,
}

/// Shareable, immutable lo-fi renderer
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline after validating `config`
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Render `input` with `effects` and return the new file's path
    ///
    /// # Errors
    /// * `InputNotAccessible` - `input` is missing, not a file, or unreadable
    /// * `ProcessingFailed` - decoding, a DSP stage or encoding failed
    /// * `EmptyOutputFailure` - the rendered file came out empty
    pub fn transform(&self, input: &Path, effects: &Effects) -> Result<PathBuf> {
        self.transform_with_report(input, effects)
            .map(|report| report.output_path)
    }

    /// Like [`Pipeline::transform`], returning the full report
    pub fn transform_with_report(&self, input: &Path, effects: &Effects) -> Result<TransformReport> {
        check_input(input)?;

        let values = effects.normalize();
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let mut chain = EffectChain::build(&values, &self.config, seed);
        let stages: Vec<String> = chain
            .stage_names()
            .into_iter()
            .map(String::from)
            .collect();

        info!(
            "Transforming {} ({} stages, seed {})",
            input.display(),
            stages.len(),
            seed
        );

        let out_dir = self.output_dir(input)?;
        let output_path = unique_output_path(input, &out_dir);
        let partial = PartialFile::new(partial_path(&output_path));
        debug!("Writing to {}", partial.path().display());

        if chain.is_empty() {
            fs::copy(input, partial.path()).map_err(|e| {
                LofiError::processing("output", format!("copy failed: {}", e))
            })?;
        } else {
            let decoded = decode_audio(input)?;
            let mut buffer = decoded.buffer;
            chain.process(&mut buffer)?;

            let gain = buffer.limit_peak(OUTPUT_CEILING);
            if gain < 1.0 {
                debug!("Output limited by {:.2} dB", linear_to_db(gain));
            }

            encode_audio(
                &buffer,
                partial.path(),
                &ContainerFormat::from_path(input),
                &ExportFormat::for_source(&decoded.source),
                &self.config.encoder,
            )?;
        }

        let bytes = fs::metadata(partial.path()).map(|m| m.len()).unwrap_or(0);
        if bytes == 0 {
            return Err(LofiError::EmptyOutputFailure { path: output_path });
        }
        let sha256 = file_sha256(partial.path())
            .map_err(|e| LofiError::processing("output", format!("checksum failed: {}", e)))?;

        partial.commit(&output_path)?;

        let duration_secs = probe_duration(&output_path);
        info!(
            "Wrote {} ({} bytes, {}s)",
            output_path.display(),
            bytes,
            duration_secs
        );

        Ok(TransformReport {
            input_path: input.to_path_buf(),
            output_path,
            bytes,
            sha256,
            duration_secs,
            stages,
            seed,
            effects: values,
        })
    }

    fn output_dir(&self, input: &Path) -> Result<PathBuf> {
        let dir = match &self.config.output_dir {
            Some(dir) => dir.clone(),
            None => match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };
        fs::create_dir_all(&dir).map_err(|e| {
            LofiError::processing(
                "output",
                format!("cannot create output directory {}: {}", dir.display(), e),
            )
        })?;
        Ok(dir)
    }
}

/// Render with the default configuration
pub fn transform(input: &Path, effects: &Effects) -> Result<PathBuf> {
    Pipeline::new(PipelineConfig::default())?.transform(input, effects)
}

fn check_input(input: &Path) -> Result<()> {
    let not_accessible = |source: Option<std::io::Error>| LofiError::InputNotAccessible {
        path: input.to_path_buf(),
        source,
    };

    let meta = fs::metadata(input).map_err(|e| not_accessible(Some(e)))?;
    if !meta.is_file() {
        return Err(not_accessible(None));
    }
    File::open(input).map_err(|e| not_accessible(Some(e)))?;
    Ok(())
}

/// `<stem>_lofi_<8 hex>.<ext>` inside `dir`, not colliding with any file
fn unique_output_path(input: &Path, dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string());
    let ext = input.extension().map(|e| e.to_string_lossy().into_owned());

    loop {
        let id = Uuid::new_v4().simple().to_string();
        let name = match &ext {
            Some(ext) => format!("{}_lofi_{}.{}", stem, &id[..8], ext),
            None => format!("{}_lofi_{}", stem, &id[..8]),
        };
        let candidate = dir.join(name);
        if !candidate.exists() && !partial_path(&candidate).exists() {
            return candidate;
        }
    }
}

/// Whether `path` carries a name produced by [`unique_output_path`]
pub(crate) fn is_rendered_output(path: &Path) -> bool {
    let stem = match path.file_stem() {
        Some(stem) => stem.to_string_lossy(),
        None => return false,
    };
    match stem.rsplit_once("_lofi_") {
        Some((base, id)) => {
            !base.is_empty()
                && id.len() == 8
                && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}

/// Hidden sibling that keeps the real extension last, so encoders still
/// recognize the container
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.partial", stem),
    };
    output.with_file_name(name)
}

fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// A partially written output, removed on drop unless committed
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Move the finished file to its final name
    fn commit(mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target).map_err(|e| {
            LofiError::processing(
                "output",
                format!("cannot move output into place at {}: {}", target.display(), e),
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed || !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}
