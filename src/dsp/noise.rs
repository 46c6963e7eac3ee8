//! Noise beds and the two noise-mix stages
//!
//! A bed is a short, seamlessly loopable buffer of synthesized noise. The
//! crackle bed is soft pink hiss with sparse decaying clicks; the background
//! bed is brown noise with the sub-audio rumble filtered out. Beds are
//! generated once per stage instance (one pipeline invocation) and looped to
//! whatever length the signal has by the time the stage runs.

use std::f32::consts::FRAC_PI_2;

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

use super::eq::{BiquadCoeffs, BiquadState, FilterType, BUTTERWORTH_Q};
use super::{ChainPosition, Effect};
use crate::engine::buffer::{calculate_rms_db, db_to_linear};
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Crossfade used to hide the loop seam
const LOOP_FADE_SECS: f32 = 0.05;

/// Average clicks per second in the crackle bed
const CRACKLE_DENSITY: f32 = 6.0;

/// Click decay time constant
const CRACKLE_DECAY_SECS: f32 = 0.002;

/// Hiss level under the clicks
const CRACKLE_HISS_RMS_DB: f32 = -36.0;

/// Target level of the brown bed
const BROWN_RMS_DB: f32 = -24.0;

/// Rumble filter for the brown bed
const BROWN_HIGH_PASS_HZ: f64 = 20.0;

// ============================================================================
// Noise Kinds
// ============================================================================

/// Which bed a stage synthesizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    VinylCrackle,
    Brown,
}

impl NoiseKind {
    /// Per-kind salt so both beds differ under one seed
    fn salt(self) -> u64 {
        match self {
            NoiseKind::VinylCrackle => 0x5649_4e59_4c43_524b,
            NoiseKind::Brown => 0x4252_4f57_4e4e_4f49,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NoiseKind::VinylCrackle => "vinyl_crackle",
            NoiseKind::Brown => "brown",
        }
    }
}

// ============================================================================
// Generators
// ============================================================================

fn white(rng: &mut ChaCha8Rng) -> f32 {
    rng.random_range(-1.0_f32..1.0)
}

/// Pink noise using Paul Kellet's refined filter
fn pink_noise(rng: &mut ChaCha8Rng, len: usize) -> Vec<f32> {
    let mut b = [0.0_f32; 7];
    (0..len)
        .map(|_| {
            let w = white(rng);
            b[0] = 0.99886 * b[0] + w * 0.0555179;
            b[1] = 0.99332 * b[1] + w * 0.0750759;
            b[2] = 0.96900 * b[2] + w * 0.1538520;
            b[3] = 0.86650 * b[3] + w * 0.3104856;
            b[4] = 0.55000 * b[4] + w * 0.5329522;
            b[5] = -0.7616 * b[5] - w * 0.0168980;
            let pink = b.iter().sum::<f32>() + w * 0.5362;
            b[6] = w * 0.115926;
            pink * 0.11
        })
        .collect()
}

/// Scale `samples` to the given RMS level
fn set_rms(samples: &mut [f32], target_db: f32) {
    let current = calculate_rms_db(samples);
    if !current.is_finite() {
        return;
    }
    let gain = db_to_linear(target_db - current);
    samples.iter_mut().for_each(|s| *s *= gain);
}

/// Pink hiss with sparse clicks at exponentially distributed spacing
fn crackle(rng: &mut ChaCha8Rng, len: usize, sample_rate: u32) -> Vec<f32> {
    let mut out = pink_noise(rng, len);
    set_rms(&mut out, CRACKLE_HISS_RMS_DB);

    let avg_spacing = sample_rate as f32 / CRACKLE_DENSITY;
    let decay = 1.0 - 1.0 / (CRACKLE_DECAY_SECS * sample_rate as f32);

    let mut click = 0.0_f32;
    let mut next_click = 0usize;
    for (i, sample) in out.iter_mut().enumerate() {
        if i >= next_click {
            let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            // Mostly faint ticks, the occasional loud pop
            let amp = if rng.random_bool(0.15) {
                rng.random_range(0.3_f32..0.6)
            } else {
                rng.random_range(0.05_f32..0.2)
            };
            click = sign * amp;

            let u: f32 = rng.random_range(0.001_f32..1.0);
            next_click = i + ((-u.ln() * avg_spacing) as usize).max(1);
        } else {
            click *= decay;
        }
        *sample += click;
    }

    out
}

/// Brown noise: leaky-integrated white noise with rumble removed
fn brown(rng: &mut ChaCha8Rng, len: usize, sample_rate: u32) -> Vec<f32> {
    let mut level = 0.0_f32;
    let mut out: Vec<f32> = (0..len)
        .map(|_| {
            level = level * 0.995 + white(rng) * 0.05;
            level
        })
        .collect();

    let coeffs = BiquadCoeffs::calculate(
        FilterType::HighPass,
        sample_rate as f64,
        BROWN_HIGH_PASS_HZ,
        0.0,
        BUTTERWORTH_Q,
    );
    BiquadState::default().process_slice(&mut out, &coeffs);
    set_rms(&mut out, BROWN_RMS_DB);
    out
}

/// Fold the last `fade` samples over the head so the buffer loops cleanly
///
/// The result is `fade` samples shorter than the input. Its last sample is
/// followed seamlessly by its first.
pub fn make_loopable(samples: &mut Vec<f32>, fade: usize) {
    let n = samples.len();
    if fade == 0 || n < fade * 2 {
        return;
    }
    let body = n - fade;
    for i in 0..fade {
        let t = i as f32 / fade as f32 * FRAC_PI_2;
        // Equal power: the two halves are uncorrelated noise
        samples[i] = samples[i] * t.sin() + samples[body + i] * t.cos();
    }
    samples.truncate(body);
}

// ============================================================================
// Noise Bed
// ============================================================================

/// A loopable noise buffer
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseBed {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl NoiseBed {
    /// Synthesize `secs` of loopable noise
    pub fn synthesize(kind: NoiseKind, sample_rate: u32, secs: f32, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ kind.salt());
        let body = ((secs * sample_rate as f32) as usize).max(1);
        let fade = (LOOP_FADE_SECS * sample_rate as f32) as usize;

        let mut samples = match kind {
            NoiseKind::VinylCrackle => crackle(&mut rng, body + fade, sample_rate),
            NoiseKind::Brown => brown(&mut rng, body + fade, sample_rate),
        };
        make_loopable(&mut samples, fade);

        Self {
            samples,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Read `len` samples starting at `offset`, wrapping around the bed
    pub fn loop_to(&self, len: usize, offset: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .copied()
            .cycle()
            .skip(offset % self.samples.len().max(1))
            .take(len)
    }
}

// ============================================================================
// Mix Stage
// ============================================================================

/// How a bed is combined with the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixMode {
    /// `signal * (1 - level) + bed * level`, bed pre-scaled by `level`
    Crossfade,
    /// `signal + bed * level`
    Additive,
}

/// Mixes a looped noise bed into the signal
#[derive(Debug, Clone)]
pub struct NoiseMix {
    kind: NoiseKind,
    mode: MixMode,
    level: f32,
    bed_secs: f32,
    seed: u64,
    bed: Option<NoiseBed>,
}

impl NoiseMix {
    pub fn new(kind: NoiseKind, mode: MixMode, level: f32, bed_secs: f32, seed: u64) -> Self {
        Self {
            kind,
            mode,
            level: level.clamp(0.0, 1.0),
            bed_secs,
            seed,
            bed: None,
        }
    }

    /// Crackle overlay as used by the lo-fi chain
    pub fn vinyl_crackle(level: f32, bed_secs: f32, seed: u64) -> Self {
        Self::new(NoiseKind::VinylCrackle, MixMode::Crossfade, level, bed_secs, seed)
    }

    /// Brown-noise floor as used by the lo-fi chain
    pub fn background(level: f32, bed_secs: f32, seed: u64) -> Self {
        Self::new(NoiseKind::Brown, MixMode::Additive, level, bed_secs, seed)
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn bed(&self) -> Option<&NoiseBed> {
        self.bed.as_ref()
    }
}

impl Effect for NoiseMix {
    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        if self.bed.as_ref().map(NoiseBed::sample_rate) != Some(buffer.sample_rate) {
            self.prepare(buffer.sample_rate, buffer.channels());
        }
        let bed = match &self.bed {
            Some(bed) if !bed.is_empty() => bed,
            _ => return Ok(()),
        };

        let level = self.level;
        let channels = buffer.channels();
        let len = buffer.len();
        for (ch, channel) in buffer.samples.iter_mut().enumerate() {
            // Channels read from spread-out offsets to avoid a mono bed
            let offset = ch * bed.len() / channels.max(1);
            for (sample, noise) in channel.iter_mut().zip(bed.loop_to(len, offset)) {
                *sample = match self.mode {
                    MixMode::Crossfade => *sample * (1.0 - level) + noise * level * level,
                    MixMode::Additive => *sample + noise * level,
                };
            }
        }

        Ok(())
    }

    fn prepare(&mut self, sample_rate: u32, _num_channels: usize) {
        let cached = self
            .bed
            .as_ref()
            .is_some_and(|bed| bed.sample_rate() == sample_rate);
        if !cached {
            debug!(
                "Synthesizing {} bed: {:.1}s at {} Hz",
                self.kind.name(),
                self.bed_secs,
                sample_rate
            );
            self.bed = Some(NoiseBed::synthesize(
                self.kind,
                sample_rate,
                self.bed_secs,
                self.seed,
            ));
        }
    }

    fn reset(&mut self) {}

    fn params(&self) -> Value {
        json!({
            "kind": self.kind.name(),
            "level": self.level,
            "bed_secs": self.bed_secs,
        })
    }

    fn effect_type(&self) -> &'static str {
        match self.kind {
            NoiseKind::VinylCrackle => "vinyl_crackle",
            NoiseKind::Brown => "background_noise",
        }
    }

    fn display_name(&self) -> &str {
        match self.kind {
            NoiseKind::VinylCrackle => "Vinyl Crackle",
            NoiseKind::Brown => "Background Noise",
        }
    }

    fn position(&self) -> ChainPosition {
        match self.kind {
            NoiseKind::VinylCrackle => ChainPosition::VinylCrackle,
            NoiseKind::Brown => ChainPosition::BackgroundNoise,
        }
    }
}
