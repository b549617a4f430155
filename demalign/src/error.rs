//! Error types for the alignment pipeline.
//!
//! Every stage returns an [`AlignError`] tagged with what went wrong; the
//! tag alone decides the [`PipelineOutcome`] and with it the process exit
//! code. Lower-level errors are carried as their display text so callers
//! never have to depend on TIFF, PROJ or HTTP error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the alignment pipeline.
#[derive(Error, Debug)]
pub enum AlignError {
    /// The input raster could not be opened or parsed.
    #[error("could not open input raster {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// Every sample of band 1 is missing (NaN).
    #[error("input raster {path} is all NaN")]
    AllMissing { path: PathBuf },

    /// The request to the terrain service did not complete.
    #[error("DEM request failed: {reason}")]
    Network { reason: String },

    /// The terrain service answered with a non-success status.
    #[error("DEM download failed (HTTP {status}): {body}")]
    RemoteService { status: u16, body: String },

    /// The downloaded DEM could not be saved.
    #[error("could not write DEM to {path}: {source}")]
    DemWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The reference grid could not be read or the reprojection failed.
    #[error("resampling failed: {0}")]
    Reprojection(String),

    /// The resampled raster could not be written.
    #[error("could not write resampled raster to {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    /// Required configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AlignError {
    /// The pipeline outcome this error signals.
    pub fn outcome(&self) -> PipelineOutcome {
        match self {
            AlignError::Open { .. } => PipelineOutcome::InputOpenFailure,
            AlignError::AllMissing { .. } => PipelineOutcome::ValidationFailure,
            AlignError::Network { .. }
            | AlignError::RemoteService { .. }
            | AlignError::DemWrite { .. } => PipelineOutcome::DownloadFailure,
            AlignError::Reprojection(_) | AlignError::Write { .. } => {
                PipelineOutcome::ResampleFailure
            }
            AlignError::Config(_) => PipelineOutcome::UsageError,
        }
    }
}

/// Result type alias using [`AlignError`].
pub type Result<T> = std::result::Result<T, AlignError>;

/// Final state of a pipeline run, one per distinct exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineOutcome {
    /// DEM and resampled raster were both created.
    Success,
    /// Wrong invocation or missing configuration.
    UsageError,
    /// The input raster could not be opened.
    InputOpenFailure,
    /// The DEM download failed.
    DownloadFailure,
    /// The input raster contains no valid samples.
    ValidationFailure,
    /// Reprojection or writing the result failed.
    ResampleFailure,
}

impl PipelineOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineOutcome::Success => 0,
            PipelineOutcome::UsageError => 1,
            PipelineOutcome::InputOpenFailure => 2,
            PipelineOutcome::DownloadFailure => 3,
            PipelineOutcome::ValidationFailure => 4,
            PipelineOutcome::ResampleFailure => 5,
        }
    }

    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineOutcome::Success => "success",
            PipelineOutcome::UsageError => "usage_error",
            PipelineOutcome::InputOpenFailure => "input_open_failure",
            PipelineOutcome::DownloadFailure => "download_failure",
            PipelineOutcome::ValidationFailure => "validation_failure",
            PipelineOutcome::ResampleFailure => "resample_failure",
        }
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&AlignError> for PipelineOutcome {
    fn from(err: &AlignError) -> Self {
        err.outcome()
    }
}
