//! DSP stages for the lo-fi chain
//!
//! Every stage implements [`Effect`] and processes a whole [`AudioBuffer`]
//! at once. [`EffectChain::build`] turns normalized slider values into the
//! ordered list of stages that actually need to run.
//!
//! [`AudioBuffer`]: crate::engine::AudioBuffer

mod bitcrush;
mod chain;
mod effect;
mod eq;
mod noise;
mod reverb;
mod stretch;

pub use bitcrush::BitCrusher;
pub use chain::{ChainPosition, EffectChain, TEMPO_SKIP_RATIO};
pub use effect::Effect;
pub use eq::{BassBoost, BiquadCoeffs, BiquadState, FilterType, BUTTERWORTH_Q};
pub use noise::{make_loopable, MixMode, NoiseBed, NoiseKind, NoiseMix};
pub use reverb::Reverb;
pub use stretch::{wsola, TimeStretch};
