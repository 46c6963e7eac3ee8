//! Error handling for the lo-fi pipeline
//!
//! `transform` surfaces exactly three failure kinds to callers
//! (input not accessible, processing failed, empty output). Everything
//! else is either internal (duration probing) or belongs to the ambient
//! layers (config, job tracking, CLI I/O).

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for lo-fi operations
pub type Result<T> = std::result::Result<T, LofiError>;

/// Main error type for lo-fi operations
#[derive(Error, Debug)]
pub enum LofiError {
    // Transform errors
    #[error("Input not accessible: {path}")]
    InputNotAccessible {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Processing failed during {stage}: {reason}")]
    ProcessingFailed { stage: String, reason: String },

    #[error("Processing produced an empty output file: {path}")]
    EmptyOutputFailure { path: PathBuf },

    // Internal only, never escapes probe_duration
    #[error("Duration probe failed for {path}: {reason}")]
    DurationProbeFailure { path: PathBuf, reason: String },

    // Job errors
    #[error("A transformation is already running for track {track_id}")]
    TransformInFlight { track_id: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LofiError {
    /// Shorthand for a `ProcessingFailed` error in the given stage
    pub fn processing(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        LofiError::ProcessingFailed {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            LofiError::InputNotAccessible { .. } => "INPUT_NOT_ACCESSIBLE",
            LofiError::ProcessingFailed { .. } => "PROCESSING_FAILED",
            LofiError::EmptyOutputFailure { .. } => "EMPTY_OUTPUT",
            LofiError::DurationProbeFailure { .. } => "DURATION_PROBE_FAILED",
            LofiError::TransformInFlight { .. } => "TRANSFORM_IN_FLIGHT",
            LofiError::InvalidConfig { .. } => "INVALID_CONFIG",
            LofiError::Io(_) => "IO_ERROR",
            LofiError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if retrying the same request later can succeed
    ///
    /// The pipeline itself never retries; this is advice for the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LofiError::TransformInFlight { .. } | LofiError::DurationProbeFailure { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LofiError::InputNotAccessible { .. } => vec![
                "Check the upload finished and the file path is correct",
                "Verify the process can read the upload directory",
            ],
            LofiError::ProcessingFailed { .. } => vec![
                "Check the file plays in another application",
                "Convert the file to WAV and upload again",
                "For non-WAV files, make sure ffmpeg is installed",
            ],
            LofiError::EmptyOutputFailure { .. } => vec![
                "Check free disk space in the output directory",
                "Try the transformation again with fewer effects",
            ],
            LofiError::TransformInFlight { .. } => {
                vec!["Wait for the running transformation to finish"]
            }
            LofiError::InvalidConfig { .. } => vec!["Fix the configuration file and restart"],
            _ => vec![],
        }
    }
}
