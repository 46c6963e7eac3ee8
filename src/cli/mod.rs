//! CLI Module
//!
//! Command-line interface for the lo-fi pipeline.

pub mod commands;

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::effects::Effects;
use crate::error::Result;

/// Lo-fi audio processor
#[derive(Parser, Debug)]
#[command(name = "lofi-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a lo-fi version of an audio file
    #[command(name = "transform")]
    Transform {
        /// Input audio file
        input: PathBuf,

        #[command(flatten)]
        effects: EffectArgs,

        /// Fixed noise seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for the rendered file (default: next to the input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print the full transform report as JSON
        #[arg(long)]
        report: bool,
    },

    /// Print the duration of an audio file in whole seconds
    #[command(name = "probe")]
    Probe {
        /// Audio file to inspect
        path: PathBuf,
    },

    /// Print the engine values derived from a set of sliders
    #[command(name = "normalize")]
    Normalize {
        #[command(flatten)]
        effects: EffectArgs,
    },

    /// Transform every audio file under a directory
    #[command(name = "batch")]
    Batch {
        /// Directory to scan recursively
        dir: PathBuf,

        #[command(flatten)]
        effects: EffectArgs,

        /// Directory for the rendered files (default: next to each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

/// Slider values, as a JSON object and/or individual overrides
#[derive(Args, Debug, Clone, Default)]
pub struct EffectArgs {
    /// Effects as a JSON object or a path to a JSON file
    #[arg(short, long)]
    pub effects: Option<String>,

    /// Vinyl crackle (0-100)
    #[arg(long)]
    pub vinyl_crackle: Option<i32>,

    /// Reverb (0-100)
    #[arg(long)]
    pub reverb: Option<i32>,

    /// Beat slowdown (0-100)
    #[arg(long)]
    pub beat_slowdown: Option<i32>,

    /// Bass boost (0-100)
    #[arg(long)]
    pub bass_boost: Option<i32>,

    /// Bit crushing (0-100)
    #[arg(long)]
    pub bit_crushing: Option<i32>,

    /// Background noise (0-100)
    #[arg(long)]
    pub background_noise: Option<i32>,
}

impl EffectArgs {
    /// Combine the JSON base (or the defaults) with the per-slider flags
    pub fn resolve(&self) -> Result<Effects> {
        let mut effects = match &self.effects {
            Some(arg) => {
                let path = PathBuf::from(arg);
                let json = if path.is_file() {
                    fs::read_to_string(&path)?
                } else {
                    arg.clone()
                };
                serde_json::from_str(&json)?
            }
            None => Effects::default(),
        };

        let overrides = [
            (self.vinyl_crackle, &mut effects.vinyl_crackle),
            (self.reverb, &mut effects.reverb),
            (self.beat_slowdown, &mut effects.beat_slowdown),
            (self.bass_boost, &mut effects.bass_boost),
            (self.bit_crushing, &mut effects.bit_crushing),
            (self.background_noise, &mut effects.background_noise),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }

        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_args_gives_defaults() {
        assert_eq!(EffectArgs::default().resolve().unwrap(), Effects::default());
    }

    #[test]
    fn test_flags_override_json() {
        let args = EffectArgs {
            effects: Some(
                r#"{"vinylCrackle":1,"reverb":2,"beatSlowdown":3,"bassBoost":4,"bitCrushing":5,"backgroundNoise":6}"#
                    .to_string(),
            ),
            reverb: Some(90),
            ..EffectArgs::default()
        };
        let effects = args.resolve().unwrap();
        assert_eq!(effects.reverb, 90);
        assert_eq!(effects.vinyl_crackle, 1);
        assert_eq!(effects.background_noise, 6);
    }

    #[test]
    fn test_effects_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("effects.json");
        fs::write(&path, serde_json::to_string(&Effects::none()).unwrap()).unwrap();

        let args = EffectArgs {
            effects: Some(path.to_string_lossy().into_owned()),
            ..EffectArgs::default()
        };
        assert_eq!(args.resolve().unwrap(), Effects::none());
    }

    #[test]
    fn test_bad_json_is_an_error() {
        let args = EffectArgs {
            effects: Some("{not json".to_string()),
            ..EffectArgs::default()
        };
        assert_eq!(args.resolve().unwrap_err().error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_parse_transform_command() {
        let cli = Cli::parse_from([
            "lofi-cli",
            "--verbose",
            "transform",
            "song.mp3",
            "--reverb",
            "10",
            "--seed",
            "5",
            "--report",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Transform {
                input,
                effects,
                seed,
                report,
                ..
            } => {
                assert_eq!(input, PathBuf::from("song.mp3"));
                assert_eq!(effects.reverb, Some(10));
                assert_eq!(seed, Some(5));
                assert!(report);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
