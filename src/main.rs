//! lofi-cli
//!
//! Command-line front end for the lo-fi pipeline.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::debug;

use lofi::cli::commands;
use lofi::cli::{Cli, Commands};
use lofi::{LofiError, PipelineConfig};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("lofi-cli v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    run(cli.command, config).map_err(|e| {
        for suggestion in e.recovery_suggestions() {
            eprintln!("hint: {}", suggestion);
        }
        anyhow::Error::new(e)
    })
}

fn run(command: Commands, mut config: PipelineConfig) -> Result<(), LofiError> {
    match command {
        Commands::Transform {
            input,
            effects,
            seed,
            output_dir,
            report,
        } => {
            if seed.is_some() {
                config.seed = seed;
            }
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }
            commands::transform(config, &input, &effects.resolve()?, report)
        }
        Commands::Probe { path } => commands::probe(&path),
        Commands::Normalize { effects } => commands::normalize(&effects.resolve()?),
        Commands::Batch {
            dir,
            effects,
            output_dir,
        } => {
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }
            commands::batch(config, &dir, &effects.resolve()?)
        }
    }
}
