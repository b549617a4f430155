//! The alignment pipeline: validate, fetch the reference DEM, resample,
//! clean up.
//!
//! Stages run strictly in order and any stage failure aborts the run with
//! an [`AlignError`] whose [`outcome`](AlignError::outcome) identifies the
//! stage. Only the final cleanup is best-effort.
//!
//! # Example
//!
//! ```ignore
//! use demalign::download::{DownloadConfig, Downloader};
//! use demalign::{Pipeline, PipelinePaths};
//!
//! let downloader = Downloader::new(DownloadConfig::from_env()?)?;
//! let pipeline = Pipeline::builder(downloader).build();
//! let report = pipeline.run(&PipelinePaths::new("upload.tif", "dem.tif", "aligned.tif"))?;
//! println!("{}x{} grid in {}", report.width, report.height, report.crs);
//! ```

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cleanup;
use crate::crs::{CoordTransformer, Crs};
use crate::error::{AlignError, Result};
use crate::geo::Bounds;
use crate::raster::{DataType, ResampledRaster, SourceRaster};
use crate::resample::{self, Resampling};
use crate::validate;

/// Something that can deliver a reference DEM covering a bounding box.
///
/// Implementations write a GeoTIFF to `dest` and must not create `dest`
/// when they fail.
pub trait DemSource {
    /// Fetch the DEM for geographic `bounds` into `dest`.
    fn fetch(&self, bounds: &Bounds, dest: &Path) -> Result<()>;
}

impl<T: DemSource + ?Sized> DemSource for &T {
    fn fetch(&self, bounds: &Bounds, dest: &Path) -> Result<()> {
        (**self).fetch(bounds, dest)
    }
}

impl<T: DemSource + ?Sized> DemSource for Box<T> {
    fn fetch(&self, bounds: &Bounds, dest: &Path) -> Result<()> {
        (**self).fetch(bounds, dest)
    }
}

/// File locations used by one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    /// Raster to align; deleted after a successful run.
    pub input: PathBuf,
    /// Where the downloaded reference DEM is saved.
    pub dem_output: PathBuf,
    /// Where the resampled raster is written.
    pub resampled_output: PathBuf,
}

impl PipelinePaths {
    pub fn new(
        input: impl Into<PathBuf>,
        dem_output: impl Into<PathBuf>,
        resampled_output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            dem_output: dem_output.into(),
            resampled_output: resampled_output.into(),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// The input raster path.
    pub input: PathBuf,
    /// The saved reference DEM.
    pub dem_path: PathBuf,
    /// The resampled raster.
    pub output_path: PathBuf,
    /// Geographic bounds sent to the DEM source.
    pub request_bounds: Bounds,
    /// Columns of the target grid.
    pub width: usize,
    /// Rows of the target grid.
    pub height: usize,
    /// CRS of the target grid.
    pub crs: Crs,
    /// Pixel type of the output (same as the input).
    pub dtype: DataType,
    /// Interpolation used.
    pub resampling: Resampling,
    /// Whether the input file was deleted.
    pub input_removed: bool,
    /// Non-fatal problems encountered.
    pub warnings: Vec<String>,
}

/// The four-stage alignment pipeline.
pub struct Pipeline<S> {
    dem_source: S,
    resampling: Resampling,
}

impl<S: DemSource> Pipeline<S> {
    /// Pipeline with default settings fetching DEMs from `dem_source`.
    pub fn new(dem_source: S) -> Self {
        Self::builder(dem_source).build()
    }

    pub fn builder(dem_source: S) -> PipelineBuilder<S> {
        PipelineBuilder::new(dem_source)
    }

    pub fn resampling(&self) -> Resampling {
        self.resampling
    }

    /// Run all stages.
    ///
    /// # Errors
    ///
    /// The first failing stage's error. Failing to delete the input is
    /// not an error; it is reported in [`PipelineReport::warnings`].
    pub fn run(&self, paths: &PipelinePaths) -> Result<PipelineReport> {
        info!(input = %paths.input.display(), "validating input raster");
        let source = validate::open_source(&paths.input)?;

        let bounds = request_bounds(&source)?;
        info!(%bounds, dem = %paths.dem_output.display(), "fetching reference DEM");
        self.dem_source.fetch(&bounds, &paths.dem_output)?;

        info!(output = %paths.resampled_output.display(), method = %self.resampling, "resampling onto DEM grid");
        let resampled = resample::align_to_reference(
            &source,
            &paths.dem_output,
            &paths.resampled_output,
            self.resampling,
        )?;

        let mut warnings = Vec::new();
        let input_removed = match cleanup::remove_input(&paths.input) {
            None => true,
            Some(warning) => {
                warnings.push(warning);
                false
            }
        };

        let ResampledRaster { grid, profile, .. } = resampled;
        Ok(PipelineReport {
            input: paths.input.clone(),
            dem_path: paths.dem_output.clone(),
            output_path: paths.resampled_output.clone(),
            request_bounds: bounds,
            width: grid.width,
            height: grid.height,
            crs: grid.crs,
            dtype: profile.dtype,
            resampling: self.resampling,
            input_removed,
            warnings,
        })
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder<S> {
    dem_source: S,
    resampling: Resampling,
}

impl<S: DemSource> PipelineBuilder<S> {
    pub fn new(dem_source: S) -> Self {
        Self {
            dem_source,
            resampling: Resampling::default(),
        }
    }

    /// Set the interpolation method (default bilinear).
    pub fn resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn build(self) -> Pipeline<S> {
        Pipeline {
            dem_source: self.dem_source,
            resampling: self.resampling,
        }
    }
}

/// Geographic bounds to request for `source`, with no padding.
///
/// Geographic sources (and sources without a CRS) are used verbatim; a
/// projected source is expressed as the lon/lat envelope of its outline.
pub fn request_bounds(source: &SourceRaster) -> Result<Bounds> {
    let bounds = source.bounds();
    match &source.profile.crs {
        None => {
            warn!("input raster has no CRS; requesting its bounds as longitude/latitude");
            Ok(bounds)
        }
        Some(crs) if crs.is_geographic() => Ok(bounds),
        Some(crs) => CoordTransformer::new(crs, &Crs::wgs84())
            .and_then(|t| t.transform_bounds(&bounds))
            .map_err(|e| {
                AlignError::Reprojection(format!(
                    "cannot express input bounds in geographic coordinates: {}",
                    e
                ))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoTransform;
    use crate::raster::{RasterProfile, GTIFF_DRIVER};
    use approx::assert_relative_eq;

    fn raster(crs: Option<Crs>, transform: GeoTransform) -> SourceRaster {
        SourceRaster {
            path: PathBuf::from("in.tif"),
            profile: RasterProfile {
                driver: GTIFF_DRIVER.to_string(),
                width: 10,
                height: 10,
                count: 1,
                dtype: DataType::Float32,
                crs,
                transform,
                nodata: None,
            },
            data: vec![1.0; 100],
        }
    }

    #[test]
    fn test_geographic_bounds_are_verbatim() {
        let r = raster(Some(Crs::wgs84()), GeoTransform::from_origin(10.0, 45.1, 0.01, 0.01));
        let b = request_bounds(&r).unwrap();
        assert_relative_eq!(b.west, 10.0);
        assert_relative_eq!(b.north, 45.1);
        assert_relative_eq!(b.east, 10.1, epsilon = 1e-12);
        assert_relative_eq!(b.south, 45.0, epsilon = 1e-12);
    }

    #[test]
    fn test_projected_bounds_become_geographic() {
        let r = raster(
            Some(Crs::Epsg(32632)),
            GeoTransform::from_origin(499_500.0, 4_984_000.0, 100.0, 100.0),
        );
        let b = request_bounds(&r).unwrap();
        assert!(b.west > 8.9 && b.west < 9.0);
        assert!(b.east > 9.0 && b.east < 9.1);
        assert!(b.south > 44.9 && b.north < 45.1);
    }

    #[test]
    fn test_unknown_projected_crs_fails() {
        let r = raster(
            Some(Crs::Epsg(2056)),
            GeoTransform::from_origin(2_600_000.0, 1_200_000.0, 10.0, 10.0),
        );
        let err = request_bounds(&r).unwrap_err();
        assert_eq!(err.outcome().exit_code(), 5);
    }

    #[test]
    fn test_builder_defaults() {
        struct Never;
        impl DemSource for Never {
            fn fetch(&self, _: &Bounds, _: &Path) -> Result<()> {
                unreachable!()
            }
        }

        assert_eq!(Pipeline::new(Never).resampling(), Resampling::Bilinear);
        let p = Pipeline::builder(Never).resampling(Resampling::Nearest).build();
        assert_eq!(p.resampling(), Resampling::Nearest);
    }
}
