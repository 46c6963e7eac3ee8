//! Lofi - lo-fi audio effects pipeline
//!
//! Takes an uploaded track and renders a new file with six "lo-fi"
//! treatments applied: beat slowdown, bass boost, bit crushing, reverb,
//! vinyl crackle and background noise. The input is never modified.
//!
//! # Architecture
//!
//! - [`effects`]: the six 0-100 sliders and their engine-ready form
//! - [`dsp`]: one `Effect` per treatment, ordered by `EffectChain`
//! - [`engine`]: planar buffers and file decode/encode
//! - [`pipeline`]: decode, process, write atomically, verify
//! - [`probe`]: duration of a file in whole seconds
//! - [`jobs`]: background transforms, one per track at a time
//!
//! ```no_run
//! use std::path::Path;
//! use lofi::{Effects, Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let output = pipeline.transform(Path::new("song.mp3"), &Effects::default())?;
//! println!("{} ({}s)", output.display(), lofi::probe_duration(&output));
//! # Ok::<(), lofi::LofiError>(())
//! ```

pub mod cli;
pub mod config;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod probe;

pub use config::PipelineConfig;
pub use effects::{Effects, NormalizedEffects};
pub use error::{LofiError, Result};
pub use jobs::{JobHandle, JobRecord, JobStatus, JobTracker};
pub use pipeline::{transform, Pipeline, TransformReport};
pub use probe::probe_duration;

#[cfg(feature = "async")]
pub use jobs::transform_async;
