//! Effect parameters
//!
//! `Effects` is the wire/UI shape: six sliders in 0..=100.
//! `NormalizedEffects` is what the DSP chain consumes, derived fresh on
//! every invocation by [`Effects::normalize`].

use serde::{Deserialize, Serialize};

/// Lowest slider value
pub const SLIDER_MIN: i32 = 0;

/// Highest slider value
pub const SLIDER_MAX: i32 = 100;

/// Bit depth floor for the crusher
pub const MIN_BIT_DEPTH: u32 = 8;

/// Bit depth at which crushing is a no-op
pub const MAX_BIT_DEPTH: u32 = 16;

/// Bass boost at a full slider
pub const MAX_BASS_BOOST_DB: f32 = 12.0;

/// Raw slider value divided by this is subtracted from 1.0 to get the tempo ratio
const SLOWDOWN_DIVISOR: f64 = 300.0;

/// The six lo-fi sliders as sent by the UI
///
/// Values are not validated on deserialization; anything outside 0..=100
/// is clamped when normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Effects {
    pub vinyl_crackle: i32,
    pub reverb: i32,
    pub beat_slowdown: i32,
    pub bass_boost: i32,
    pub bit_crushing: i32,
    pub background_noise: i32,
}

impl Default for Effects {
    fn default() -> Self {
        Self {
            vinyl_crackle: 65,
            reverb: 40,
            beat_slowdown: 25,
            bass_boost: 50,
            bit_crushing: 20,
            background_noise: 35,
        }
    }
}

impl Effects {
    /// All sliders at zero
    pub fn none() -> Self {
        Self {
            vinyl_crackle: 0,
            reverb: 0,
            beat_slowdown: 0,
            bass_boost: 0,
            bit_crushing: 0,
            background_noise: 0,
        }
    }

    /// Copy with every slider clamped to 0..=100
    pub fn clamped(&self) -> Self {
        let c = |v: i32| v.clamp(SLIDER_MIN, SLIDER_MAX);
        Self {
            vinyl_crackle: c(self.vinyl_crackle),
            reverb: c(self.reverb),
            beat_slowdown: c(self.beat_slowdown),
            bass_boost: c(self.bass_boost),
            bit_crushing: c(self.bit_crushing),
            background_noise: c(self.background_noise),
        }
    }

    /// Map the sliders onto engine-ready values
    pub fn normalize(&self) -> NormalizedEffects {
        let e = self.clamped();
        let unit = |v: i32| v as f32 / SLIDER_MAX as f32;

        let bit_depth = ((1.0 - unit(e.bit_crushing)) * MAX_BIT_DEPTH as f32).round() as u32;

        NormalizedEffects {
            vinyl_crackle: unit(e.vinyl_crackle),
            reverb: unit(e.reverb),
            beat_slowdown_ratio: 1.0 - e.beat_slowdown as f64 / SLOWDOWN_DIVISOR,
            bass_boost_db: unit(e.bass_boost) * MAX_BASS_BOOST_DB,
            bit_depth: bit_depth.clamp(MIN_BIT_DEPTH, MAX_BIT_DEPTH),
            background_noise: unit(e.background_noise),
        }
    }
}

/// Engine-ready effect values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEffects {
    /// Crackle mix weight, 0..1
    pub vinyl_crackle: f32,
    /// Reverb wet amount, 0..1
    pub reverb: f32,
    /// Tempo ratio; output duration is input duration divided by this
    pub beat_slowdown_ratio: f64,
    /// Low-shelf gain in dB, 0..12
    pub bass_boost_db: f32,
    /// Quantization depth, 8..=16
    pub bit_depth: u32,
    /// Background noise mix weight, 0..1
    pub background_noise: f32,
}

impl NormalizedEffects {
    /// Expected output length for an input of `input_secs`
    pub fn stretched_duration(&self, input_secs: f64) -> f64 {
        input_secs / self.beat_slowdown_ratio
    }
}
