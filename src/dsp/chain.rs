//! Effect chain management
//!
//! Stages always run in a fixed order: tempo first, then spectral shaping,
//! then noise mixing. The order is carried by `ChainPosition`, so stages can
//! be added in any order and still land in the right slot.

use log::debug;
use serde_json::{json, Value};

use super::{BassBoost, BitCrusher, Effect, NoiseMix, Reverb, TimeStretch};
use crate::config::PipelineConfig;
use crate::effects::{NormalizedEffects, MAX_BIT_DEPTH};
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Ratios at or above this are treated as no slowdown
pub const TEMPO_SKIP_RATIO: f64 = 0.999;

/// Fixed slot of each stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainPosition {
    Tempo = 0,
    BassBoost = 1,
    BitCrush = 2,
    Reverb = 3,
    VinylCrackle = 4,
    BackgroundNoise = 5,
}

/// Ordered chain of stages for one render
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    /// Create a new empty effect chain
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    /// Build the lo-fi chain for a set of normalized values
    ///
    /// Stages whose value falls at or below their skip threshold are left
    /// out, so an all-zero input yields an empty chain.
    pub fn build(values: &NormalizedEffects, config: &PipelineConfig, seed: u64) -> Self {
        let thresholds = &config.thresholds;
        let mut chain = Self::new();

        if values.beat_slowdown_ratio < TEMPO_SKIP_RATIO {
            chain.add(Box::new(TimeStretch::new(
                values.beat_slowdown_ratio,
                config.stretch_window_ms,
            )));
        }
        if values.bass_boost_db > thresholds.bass_boost_db {
            chain.add(Box::new(BassBoost::new(
                values.bass_boost_db,
                config.bass_boost_hz,
            )));
        }
        if values.bit_depth < MAX_BIT_DEPTH {
            chain.add(Box::new(BitCrusher::new(values.bit_depth)));
        }
        if values.reverb > thresholds.reverb {
            chain.add(Box::new(Reverb::new(values.reverb)));
        }
        if values.vinyl_crackle > thresholds.vinyl_crackle {
            chain.add(Box::new(NoiseMix::vinyl_crackle(
                values.vinyl_crackle,
                config.noise_bed_secs,
                seed,
            )));
        }
        if values.background_noise > thresholds.background_noise {
            chain.add(Box::new(NoiseMix::background(
                values.background_noise,
                config.noise_bed_secs,
                seed,
            )));
        }

        debug!("Built chain: {:?}", chain.stage_names());
        chain
    }

    /// Add a stage at its fixed position
    ///
    /// A stage with the same position as an existing one goes after it.
    pub fn add(&mut self, effect: Box<dyn Effect>) {
        let position = effect.position();
        let index = self
            .effects
            .iter()
            .position(|e| e.position() > position)
            .unwrap_or(self.effects.len());
        self.effects.insert(index, effect);
    }

    /// Run every stage over the buffer in order
    ///
    /// Each stage is prepared for the buffer's current format right before it
    /// runs. The first failing stage aborts the chain.
    pub fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        for effect in &mut self.effects {
            effect.prepare(buffer.sample_rate, buffer.channels());
            debug!(
                "Running {} ({} samples): {}",
                effect.display_name(),
                buffer.len(),
                effect.params()
            );
            effect.process_safe(buffer)?;
        }
        Ok(())
    }

    /// Get the number of stages in the chain
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Stage identifiers in processing order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.effect_type()).collect()
    }

    /// Serialize chain state to JSON
    pub fn to_json(&self) -> Value {
        let stages: Vec<Value> = self
            .effects
            .iter()
            .map(|e| {
                json!({
                    "type": e.effect_type(),
                    "name": e.display_name(),
                    "params": e.params(),
                })
            })
            .collect();

        json!({ "stages": stages })
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}
