//! Bit crusher
//!
//! Rounds every sample onto a grid of 2^(bits-1) steps per unit of
//! amplitude. At 16 bits this matches the resolution of CD audio and is
//! inaudible; at 8 bits it is plainly crunchy.

use serde_json::{json, Value};

use super::{ChainPosition, Effect};
use crate::effects::{MAX_BIT_DEPTH, MIN_BIT_DEPTH};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::impl_effect_common;

/// Sample quantizer
#[derive(Debug, Clone)]
pub struct BitCrusher {
    bit_depth: u32,
    levels: f32,
}

impl BitCrusher {
    /// Create a crusher for `bit_depth` bits (clamped to 8..=16)
    pub fn new(bit_depth: u32) -> Self {
        let bit_depth = bit_depth.clamp(MIN_BIT_DEPTH, MAX_BIT_DEPTH);
        Self {
            bit_depth,
            levels: 2.0_f32.powi(bit_depth as i32 - 1),
        }
    }

    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    /// Snap onto the grid; small negatives land on +0.0, not -0.0
    #[inline]
    fn quantize(&self, sample: f32) -> f32 {
        ((sample * self.levels).round() / self.levels).clamp(-1.0, 1.0) + 0.0
    }
}

impl Effect for BitCrusher {
    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        for channel in &mut buffer.samples {
            for sample in channel.iter_mut() {
                *sample = self.quantize(*sample);
            }
        }
        Ok(())
    }

    fn prepare(&mut self, _sample_rate: u32, _num_channels: usize) {}

    fn reset(&mut self) {}

    fn params(&self) -> Value {
        json!({ "bit_depth": self.bit_depth })
    }

    impl_effect_common!("bit_crusher", "Bit Crusher", ChainPosition::BitCrush);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generate_test_tone;
    use std::collections::HashSet;

    #[test]
    fn test_depth_is_clamped() {
        assert_eq!(BitCrusher::new(4).bit_depth(), 8);
        assert_eq!(BitCrusher::new(24).bit_depth(), 16);
    }

    #[test]
    fn test_eight_bits_limits_distinct_levels() {
        let mut buffer = generate_test_tone(440.0, 0.5, 44100);
        BitCrusher::new(8).process(&mut buffer).unwrap();

        let distinct: HashSet<i32> = buffer
            .channel(0)
            .iter()
            .map(|s| (s * 128.0).round() as i32)
            .collect();
        // 0.5 amplitude sine on a 128-step grid
        assert!(distinct.len() <= 129, "found {} levels", distinct.len());
    }

    #[test]
    fn test_zero_has_a_single_representation() {
        let crusher = BitCrusher::new(8);
        let from_negative = crusher.quantize(-0.001);
        let from_positive = crusher.quantize(0.001);

        assert_eq!(from_negative.to_bits(), 0.0_f32.to_bits());
        assert_eq!(from_negative.to_bits(), from_positive.to_bits());
    }

    #[test]
    fn test_sixteen_bits_is_near_transparent() {
        let input = generate_test_tone(440.0, 0.5, 44100);
        let mut output = input.clone();
        BitCrusher::new(16).process(&mut output).unwrap();

        let max_error = input
            .channel(0)
            .iter()
            .zip(output.channel(0))
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_error <= 1.0 / 32768.0 + 1e-7, "max error {}", max_error);
    }

    #[test]
    fn test_eight_bits_is_audibly_lossy() {
        let input = generate_test_tone(440.0, 0.5, 44100);
        let mut output = input.clone();
        BitCrusher::new(8).process(&mut output).unwrap();

        let max_error = input
            .channel(0)
            .iter()
            .zip(output.channel(0))
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_error > 1.0 / 1024.0);
    }
}
