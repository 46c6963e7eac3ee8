//! Effect trait definition
//!
//! Base trait for every stage of the lo-fi chain.

use serde_json::Value;

use super::ChainPosition;
use crate::engine::AudioBuffer;
use crate::error::{LofiError, Result};

/// Base trait for all DSP stages
///
/// Stages process a whole buffer at once. A stage may change the buffer
/// length (time stretch), but never its channel count or sample rate.
pub trait Effect: Send {
    /// Process the buffer in place
    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()>;

    /// Prepare for the given sample rate and channel count
    ///
    /// Called by the chain before every `process`.
    fn prepare(&mut self, sample_rate: u32, num_channels: usize);

    /// Clear internal state (filter history, delay lines)
    fn reset(&mut self);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Get human-readable display name
    fn display_name(&self) -> &str;

    /// Fixed slot of this stage in the chain
    fn position(&self) -> ChainPosition;

    /// Current parameters as JSON, for logs and reports
    fn params(&self) -> Value;

    /// Process and reject output containing NaN/Inf
    fn process_safe(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        self.process(buffer)?;

        if !buffer.is_finite() {
            return Err(LofiError::processing(
                self.effect_type(),
                "stage produced invalid audio (NaN/Inf)",
            ));
        }

        Ok(())
    }
}

/// Helper macro to implement the identification methods of `Effect`
#[macro_export]
macro_rules! impl_effect_common {
    ($effect_type:expr, $display_name:expr, $position:expr) => {
        fn effect_type(&self) -> &'static str {
            $effect_type
        }

        fn display_name(&self) -> &str {
            $display_name
        }

        fn position(&self) -> $crate::dsp::ChainPosition {
            $position
        }
    };
}
