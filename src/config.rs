//! Pipeline configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! (or no file at all) yields a working pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LofiError, Result};

/// Default length of a synthesized noise bed before looping
const DEFAULT_NOISE_BED_SECS: f32 = 8.0;

/// Default center of the bass shelf
const DEFAULT_BASS_BOOST_HZ: f32 = 100.0;

/// Default WSOLA window
const DEFAULT_STRETCH_WINDOW_MS: f32 = 40.0;

/// Levels at or below which a stage is skipped entirely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipThresholds {
    /// Minimum bass boost in dB
    pub bass_boost_db: f32,
    /// Minimum reverb wet amount
    pub reverb: f32,
    /// Minimum crackle mix weight
    pub vinyl_crackle: f32,
    /// Minimum background noise mix weight
    pub background_noise: f32,
}

impl Default for SkipThresholds {
    fn default() -> Self {
        Self {
            bass_boost_db: 0.1,
            reverb: 0.1,
            vinyl_crackle: 0.05,
            background_noise: 0.05,
        }
    }
}

/// How non-WAV containers are re-encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// ffmpeg executable used for mp3/ogg/flac output
    pub ffmpeg_path: PathBuf,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory for rendered files; `None` writes next to the input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Fixed noise seed; `None` draws a fresh seed per invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Length of each synthesized noise bed in seconds
    pub noise_bed_secs: f32,

    /// Bass shelf corner frequency in Hz
    pub bass_boost_hz: f32,

    /// Time-stretch analysis window in milliseconds
    pub stretch_window_ms: f32,

    pub thresholds: SkipThresholds,

    pub encoder: EncoderSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            seed: None,
            noise_bed_secs: DEFAULT_NOISE_BED_SECS,
            bass_boost_hz: DEFAULT_BASS_BOOST_HZ,
            stretch_window_ms: DEFAULT_STRETCH_WINDOW_MS,
            thresholds: SkipThresholds::default(),
            encoder: EncoderSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| LofiError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=60.0).contains(&self.noise_bed_secs) {
            return Err(LofiError::InvalidConfig {
                reason: format!("noise_bed_secs {} outside 0.5..=60", self.noise_bed_secs),
            });
        }
        if !(20.0..=500.0).contains(&self.bass_boost_hz) {
            return Err(LofiError::InvalidConfig {
                reason: format!("bass_boost_hz {} outside 20..=500", self.bass_boost_hz),
            });
        }
        if !(10.0..=200.0).contains(&self.stretch_window_ms) {
            return Err(LofiError::InvalidConfig {
                reason: format!(
                    "stretch_window_ms {} outside 10..=200",
                    self.stretch_window_ms
                ),
            });
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("reverb", t.reverb),
            ("vinyl_crackle", t.vinyl_crackle),
            ("background_noise", t.background_noise),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LofiError::InvalidConfig {
                    reason: format!("threshold {} = {} outside 0..=1", name, value),
                });
            }
        }
        if t.bass_boost_db < 0.0 {
            return Err(LofiError::InvalidConfig {
                reason: "threshold bass_boost_db must not be negative".to_string(),
            });
        }

        if let Some(dir) = &self.output_dir {
            if dir.as_os_str().is_empty() {
                return Err(LofiError::InvalidConfig {
                    reason: "output_dir must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
