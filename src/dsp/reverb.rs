//! Reverb stage
//!
//! Freeverb topology:
//! - 8 parallel lowpass-feedback comb filters per channel
//! - 4 series allpass filters per channel for diffusion
//! - right channel delays offset by a fixed stereo spread
//!
//! A single `amount` in 0..=1 drives room size, wet and dry levels.

use serde_json::{json, Value};

use super::{ChainPosition, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::impl_effect_common;

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for Freeverb delays
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Stereo spread offset in samples (for right channel)
const STEREO_SPREAD: usize = 23;

/// Fixed gain for allpass filters
const ALLPASS_GAIN: f32 = 0.5;

/// Input attenuation before the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Wet level scale
const WET_SCALE: f32 = 3.0;

const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;

/// Damping used for every amount
const DAMPING: f32 = 0.5;

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let output = self.buffer[self.pos];

        // One-pole low-pass in the feedback path
        self.filter_state = output * damp1 + self.filter_state * damp2;
        self.buffer[self.pos] = input + self.filter_state * feedback;

        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.pos = 0;
    }
}

/// Schroeder allpass for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - input;
        self.buffer[self.pos] = input + delayed * ALLPASS_GAIN;

        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel of the Freeverb network
#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(scale: f64, spread: usize) -> Self {
        let scaled = |d: usize| (((d + spread) as f64 * scale) as usize).max(1);
        Self {
            combs: COMB_DELAYS.iter().map(|&d| CombFilter::new(scaled(d))).collect(),
            allpasses: ALLPASS_DELAYS
                .iter()
                .map(|&d| AllpassFilter::new(scaled(d)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damp1, damp2);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllpassFilter::clear);
    }
}

// ============================================================================
// Reverb Stage
// ============================================================================

/// Room reverb driven by a single amount
#[derive(Debug, Clone)]
pub struct Reverb {
    amount: f32,
    room_size: f32,
    wet: f32,
    dry: f32,
    tanks: Vec<Tank>,
}

impl Reverb {
    /// Create a reverb for `amount` in 0..=1
    pub fn new(amount: f32) -> Self {
        let amount = amount.clamp(0.0, 1.0);
        Self {
            amount,
            room_size: 0.5 + 0.35 * amount,
            wet: amount,
            dry: 1.0 - 0.5 * amount,
            tanks: Vec::new(),
        }
    }

    fn coefficients(&self) -> (f32, f32, f32) {
        let feedback = self.room_size * ROOM_SCALE + ROOM_OFFSET;
        let damp2 = DAMPING * DAMP_SCALE;
        (feedback, 1.0 - damp2, damp2)
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let (feedback, damp1, damp2) = self.coefficients();
        let wet = self.wet * WET_SCALE;
        let dry = self.dry;
        let channels = buffer.channels();
        if self.tanks.len() != channels.clamp(1, 2) {
            self.prepare(buffer.sample_rate, channels);
        }

        match channels {
            1 => {
                let tank = &mut self.tanks[0];
                for sample in buffer.samples[0].iter_mut() {
                    let input = *sample;
                    let out = tank.process(input * FIXED_GAIN, feedback, damp1, damp2);
                    *sample = input * dry + out * wet;
                }
            }
            _ => {
                // Both tanks are fed the mono sum; the spread decorrelates them
                let (left, rest) = buffer.samples.split_at_mut(1);
                let left = &mut left[0];
                let right = &mut rest[0];
                let (tank_l, tank_r) = self.tanks.split_at_mut(1);

                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let input = (*l + *r) * 0.5 * FIXED_GAIN;
                    let out_l = tank_l[0].process(input, feedback, damp1, damp2);
                    let out_r = tank_r[0].process(input, feedback, damp1, damp2);
                    *l = *l * dry + out_l * wet;
                    *r = *r * dry + out_r * wet;
                }
            }
        }

        Ok(())
    }

    fn prepare(&mut self, sample_rate: u32, num_channels: usize) {
        let scale = sample_rate as f64 / REFERENCE_SAMPLE_RATE;
        self.tanks = (0..num_channels.clamp(1, 2))
            .map(|ch| Tank::new(scale, ch * STEREO_SPREAD))
            .collect();
    }

    fn reset(&mut self) {
        self.tanks.iter_mut().for_each(Tank::clear);
    }

    fn params(&self) -> Value {
        json!({
            "amount": self.amount,
            "room_size": self.room_size,
            "wet": self.wet,
            "dry": self.dry,
        })
    }

    impl_effect_common!("reverb", "Reverb", ChainPosition::Reverb);
}
