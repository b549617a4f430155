//! # demalign - DEM grid alignment
//!
//! Aligns a single-band elevation raster to the pixel grid of a reference
//! DEM fetched from a global terrain-data service.
//!
//! ## Pipeline
//!
//! 1. **Validate**: open the input GeoTIFF, read band 1, reject rasters
//!    that are entirely NaN.
//! 2. **Acquire**: download a DEM covering the input's bounds (no padding).
//! 3. **Resample**: interpolate the input onto the DEM's grid (transform,
//!    CRS and shape), keeping the input's pixel type.
//! 4. **Clean up**: delete the input file (best-effort).
//!
//! Every stage failure maps to a distinct [`PipelineOutcome`] and exit code.
//!
//! ## Quick Start
//!
//! ```ignore
//! use demalign::download::{DownloadConfig, Downloader};
//! use demalign::{Pipeline, PipelinePaths};
//!
//! let downloader = Downloader::new(DownloadConfig::new("my-api-key"))?;
//! let report = Pipeline::new(downloader)
//!     .run(&PipelinePaths::new("upload.tif", "dem.tif", "aligned.tif"))?;
//! println!("aligned onto {}x{} grid", report.width, report.height);
//! ```
//!
//! ## Features
//!
//! - `download`: the HTTP [`download::Downloader`]. Without it, plug in
//!   any [`DemSource`].

pub mod cleanup;
pub mod crs;
#[cfg(feature = "download")]
pub mod download;
pub mod error;
pub mod geo;
pub mod geotiff;
pub mod pipeline;
pub mod raster;
pub mod resample;
pub mod sweep;
pub mod validate;

// Re-export main types at crate root for convenience
pub use crs::Crs;
pub use error::{AlignError, PipelineOutcome, Result};
pub use geo::{Bounds, GeoTransform};
pub use pipeline::{DemSource, Pipeline, PipelineBuilder, PipelinePaths, PipelineReport};
pub use raster::{DataType, RasterProfile, ReferenceGrid, ResampledRaster, SourceRaster};
pub use resample::Resampling;
pub use sweep::{SweepConfig, SweepReport};
