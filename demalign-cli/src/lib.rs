//! Shared pieces of the `demalign` and `demalign-sweep` binaries.

use std::path::Path;
use std::time::Duration;

use demalign::{AlignError, Bounds, DemSource, PipelineOutcome, PipelineReport, SweepReport};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "demalign=info,demalign_cli=info";

/// Install the stderr tracing subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Wraps a [`DemSource`] with a terminal spinner while the DEM is fetched.
pub struct ProgressSource<S> {
    inner: S,
    enabled: bool,
}

impl<S> ProgressSource<S> {
    pub fn new(inner: S, enabled: bool) -> Self {
        Self { inner, enabled }
    }
}

impl<S: DemSource> DemSource for ProgressSource<S> {
    fn fetch(&self, bounds: &Bounds, dest: &Path) -> demalign::Result<()> {
        if !self.enabled {
            return self.inner.fetch(bounds, dest);
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Downloading DEM ({})", bounds));
        pb.enable_steady_tick(Duration::from_millis(100));

        let result = self.inner.fetch(bounds, dest);
        match &result {
            Ok(()) => pb.finish_with_message("DEM downloaded"),
            Err(_) => pb.abandon_with_message("DEM download failed"),
        }
        result
    }
}

/// JSON form of a successful pipeline run.
#[derive(Serialize)]
pub struct RunJson<'a> {
    pub status: &'static str,
    pub exit_code: u8,
    pub input: String,
    pub dem: String,
    pub output: String,
    /// `[west, south, east, north]` sent to the terrain service.
    pub bounds: [f64; 4],
    pub width: usize,
    pub height: usize,
    pub crs: String,
    pub dtype: &'static str,
    pub resampling: &'static str,
    pub input_removed: bool,
    pub warnings: &'a [String],
}

impl<'a> From<&'a PipelineReport> for RunJson<'a> {
    fn from(report: &'a PipelineReport) -> Self {
        let b = report.request_bounds;
        Self {
            status: PipelineOutcome::Success.as_str(),
            exit_code: PipelineOutcome::Success.exit_code(),
            input: report.input.display().to_string(),
            dem: report.dem_path.display().to_string(),
            output: report.output_path.display().to_string(),
            bounds: [b.west, b.south, b.east, b.north],
            width: report.width,
            height: report.height,
            crs: report.crs.to_string(),
            dtype: report.dtype.name(),
            resampling: report.resampling.as_str(),
            input_removed: report.input_removed,
            warnings: &report.warnings,
        }
    }
}

/// JSON form of a failed pipeline run.
#[derive(Serialize)]
pub struct FailureJson {
    pub status: &'static str,
    pub exit_code: u8,
    pub error: String,
}

impl From<&AlignError> for FailureJson {
    fn from(err: &AlignError) -> Self {
        let outcome = err.outcome();
        Self {
            status: outcome.as_str(),
            exit_code: outcome.exit_code(),
            error: err.to_string(),
        }
    }
}

/// JSON form of a sweep.
#[derive(Serialize)]
pub struct SweepJson {
    pub deleted: Vec<String>,
    pub failed: Vec<SweepFailureJson>,
}

#[derive(Serialize)]
pub struct SweepFailureJson {
    pub path: String,
    pub reason: String,
}

impl From<&SweepReport> for SweepJson {
    fn from(report: &SweepReport) -> Self {
        Self {
            deleted: report
                .deleted
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            failed: report
                .failed
                .iter()
                .map(|f| SweepFailureJson {
                    path: f.path.display().to_string(),
                    reason: f.reason.clone(),
                })
                .collect(),
        }
    }
}
