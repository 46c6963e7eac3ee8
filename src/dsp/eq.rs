//! Biquad filters and the bass boost stage
//!
//! Coefficients follow the Audio EQ Cookbook. The bass boost is a single
//! low shelf; the high-pass shape strips rumble from the brown noise bed.

use serde_json::{json, Value};
use std::f64::consts::PI;

use super::{ChainPosition, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::impl_effect_common;

/// Butterworth Q
pub const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Filter shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Boost/cut below frequency
    LowShelf,
    /// Remove below frequency
    HighPass,
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    pub fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Clamp frequency to valid range (below Nyquist)
        let freq = frequency.clamp(10.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::LowShelf => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Process a single sample (direct form I)
    #[inline]
    pub fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Run a whole slice through the filter
    pub fn process_slice(&mut self, samples: &mut [f32], coeffs: &BiquadCoeffs) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample as f64, coeffs) as f32;
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Low-shelf bass boost
#[derive(Debug, Clone)]
pub struct BassBoost {
    gain_db: f32,
    frequency: f32,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl BassBoost {
    /// Create a shelf of `gain_db` below `frequency` Hz
    pub fn new(gain_db: f32, frequency: f32) -> Self {
        Self {
            gain_db,
            frequency,
            coeffs: BiquadCoeffs::default(),
            states: Vec::new(),
        }
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }
}

impl Effect for BassBoost {
    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        for (channel, state) in buffer.samples.iter_mut().zip(self.states.iter_mut()) {
            state.process_slice(channel, &self.coeffs);
        }
        Ok(())
    }

    fn prepare(&mut self, sample_rate: u32, num_channels: usize) {
        self.coeffs = BiquadCoeffs::calculate(
            FilterType::LowShelf,
            sample_rate as f64,
            self.frequency as f64,
            self.gain_db as f64,
            BUTTERWORTH_Q,
        );
        self.states = vec![BiquadState::default(); num_channels];
    }

    fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }

    fn params(&self) -> Value {
        json!({ "gain_db": self.gain_db, "frequency": self.frequency })
    }

    impl_effect_common!("bass_boost", "Bass Boost", ChainPosition::BassBoost);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::calculate_rms_db;
    use crate::engine::generate_test_tone;

    fn gain_at(frequency: f32, boost_db: f32) -> f32 {
        let input = generate_test_tone(frequency, 1.0, 44100);
        let mut output = input.clone();

        let mut boost = BassBoost::new(boost_db, 100.0);
        boost.prepare(44100, 1);
        boost.process(&mut output).unwrap();

        // Skip the filter settling time
        let settle = 4410;
        calculate_rms_db(&output.channel(0)[settle..]) - calculate_rms_db(&input.channel(0)[settle..])
    }

    #[test]
    fn test_bass_boost_lifts_lows() {
        let gain = gain_at(40.0, 12.0);
        assert!(gain > 9.0, "40 Hz gain was {:.2} dB", gain);
    }

    #[test]
    fn test_bass_boost_leaves_highs() {
        let gain = gain_at(5000.0, 12.0);
        assert!(gain.abs() < 0.5, "5 kHz gain was {:.2} dB", gain);
    }

    #[test]
    fn test_zero_gain_is_transparent() {
        let gain = gain_at(60.0, 0.0);
        assert!(gain.abs() < 0.01, "0 dB shelf changed level by {:.3} dB", gain);
    }

    #[test]
    fn test_high_pass_removes_dc() {
        let coeffs = BiquadCoeffs::calculate(FilterType::HighPass, 44100.0, 20.0, 0.0, BUTTERWORTH_Q);
        let mut state = BiquadState::default();
        let mut samples = vec![0.5_f32; 44100];
        state.process_slice(&mut samples, &coeffs);
        assert!(samples[44099].abs() < 0.01);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut boost = BassBoost::new(6.0, 100.0);
        boost.prepare(8000, 1);
        let mut buffer = generate_test_tone(50.0, 0.1, 8000);
        boost.process(&mut buffer).unwrap();
        boost.reset();
        assert_eq!(boost.states[0].y1, 0.0);
        assert_eq!(boost.effect_type(), "bass_boost");
        assert_eq!(boost.params()["gain_db"], 6.0);
    }
}
