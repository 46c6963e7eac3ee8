//! Audio Buffer Management
//!
//! Planar 32-bit float buffers. Unlike a fixed-rate engine, the pipeline
//! keeps the source sample rate end to end so re-encoding does not resample.

use crate::error::{LofiError, Result};

/// Peak ceiling applied before encoding (about -0.1 dBFS)
pub const OUTPUT_CEILING: f32 = 0.989;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of a slice in dB
///
/// Returns -f32::INFINITY for empty or silent input.
pub fn calculate_rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_squares / samples.len() as f64).sqrt() as f32;
    linear_to_db(rms)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Planar audio buffer
///
/// ```
/// use lofi::engine::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(44100, ChannelLayout::Stereo, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// Fails if the data length is not a whole number of frames.
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(LofiError::processing(
                "decode",
                format!(
                    "interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            ));
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Average of all channels
    pub fn mono_mix(&self) -> Vec<f32> {
        let channels = self.channels();
        if channels == 1 {
            return self.samples[0].clone();
        }

        let scale = 1.0 / channels.max(1) as f32;
        (0..self.len())
            .map(|i| self.samples.iter().map(|ch| ch[i]).sum::<f32>() * scale)
            .collect()
    }

    /// Absolute peak across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Check that every sample is finite (no NaN/Inf)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .all(|s| s.is_finite())
    }

    /// Multiply every sample by `gain`
    pub fn scale(&mut self, gain: f32) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Scale the buffer down so its peak sits at `ceiling`
    ///
    /// Buffers already under the ceiling are left untouched. Returns the
    /// gain that was applied.
    pub fn limit_peak(&mut self, ceiling: f32) -> f32 {
        let peak = self.peak();
        if peak <= ceiling || peak == 0.0 {
            return 1.0;
        }
        let gain = ceiling / peak;
        self.scale(gain);
        gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_conversions() {
        assert_relative_eq!(db_to_linear(0.0), 1.0);
        assert_relative_eq!(db_to_linear(-6.0), 0.501, epsilon = 0.001);
        assert_relative_eq!(linear_to_db(1.0), 0.0);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_interleave_roundtrip() {
        let interleaved = vec![1.0, 5.0, 2.0, 6.0, 3.0, 7.0];
        let buffer = AudioBuffer::from_interleaved(&interleaved, ChannelLayout::Stereo, 8000)
            .unwrap();
        assert_eq!(buffer.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1), &[5.0, 6.0, 7.0]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_from_interleaved_rejects_partial_frame() {
        let result = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], ChannelLayout::Stereo, 8000);
        assert!(matches!(result, Err(LofiError::ProcessingFailed { .. })));
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(22050, ChannelLayout::Mono, 44100);
        assert_relative_eq!(buffer.duration_secs(), 0.5);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_mono_mix() {
        let buffer = AudioBuffer {
            samples: vec![vec![1.0, 0.0], vec![0.0, -1.0]],
            sample_rate: 8000,
        };
        assert_eq!(buffer.mono_mix(), vec![0.5, -0.5]);
    }

    #[test]
    fn test_limit_peak() {
        let mut buffer = AudioBuffer {
            samples: vec![vec![2.0, -1.0, 0.5]],
            sample_rate: 8000,
        };
        let gain = buffer.limit_peak(1.0);
        assert_relative_eq!(gain, 0.5);
        assert_relative_eq!(buffer.peak(), 1.0);

        // Already under the ceiling
        assert_relative_eq!(buffer.limit_peak(1.0), 1.0);
    }

    #[test]
    fn test_is_finite() {
        let mut buffer = AudioBuffer::new(4, ChannelLayout::Mono, 8000);
        assert!(buffer.is_finite());
        buffer.channel_mut(0)[2] = f32::NAN;
        assert!(!buffer.is_finite());
    }

    #[test]
    fn test_rms_db() {
        assert_eq!(calculate_rms_db(&[]), f32::NEG_INFINITY);
        assert_relative_eq!(calculate_rms_db(&[1.0, -1.0]), 0.0);
    }
}
