//! Grid resampling: re-interpolate a source raster onto a reference grid.
//!
//! For every destination pixel the centre is mapped through the
//! destination transform into the destination CRS, transformed into the
//! source CRS, and finally mapped through the inverse source transform into
//! fractional source pixel coordinates, where the sample is interpolated.
//!
//! The source and the destination are different types ([`SourceRaster`]
//! and [`ReferenceGrid`]), so their roles cannot be swapped by accident.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::crs::CoordTransformer;
use crate::error::{AlignError, Result};
use crate::geotiff;
use crate::raster::{RasterProfile, ReferenceGrid, ResampledRaster, SourceRaster};

/// Interpolation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    /// Weighted average of the four nearest samples.
    #[default]
    Bilinear,
    /// Value of the sample containing the point.
    Nearest,
}

impl Resampling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resampling::Bilinear => "bilinear",
            Resampling::Nearest => "nearest",
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" => Ok(Resampling::Bilinear),
            "nearest" => Ok(Resampling::Nearest),
            other => Err(format!(
                "unknown resampling method '{}' (expected bilinear or nearest)",
                other
            )),
        }
    }
}

/// Read the target grid (transform, CRS, shape) of the reference DEM.
///
/// Only the georeferencing tags are read; elevation values are ignored.
pub fn reference_grid<P: AsRef<Path>>(dem_path: P) -> Result<ReferenceGrid> {
    let dem_path = dem_path.as_ref();
    let info = geotiff::read_grid(dem_path).map_err(|e| {
        AlignError::Reprojection(format!(
            "could not read reference DEM {}: {}",
            dem_path.display(),
            e
        ))
    })?;
    let crs = info.crs.ok_or_else(|| {
        AlignError::Reprojection(format!(
            "reference DEM {} has no CRS",
            dem_path.display()
        ))
    })?;

    Ok(ReferenceGrid {
        transform: info.transform,
        crs,
        width: info.width,
        height: info.height,
    })
}

/// Resample `source` onto `target`, returning a fresh row-major buffer.
///
/// The source is left untouched. Values are coerced to the source data
/// type; destination pixels without source data get the fill value (the
/// source nodata, else NaN for floats, else 0).
///
/// # Errors
///
/// Returns [`AlignError::Reprojection`] if the source has no CRS, its
/// transform is degenerate, its buffer does not match its shape, or no
/// transform exists between the two CRSs.
pub fn reproject(
    source: &SourceRaster,
    target: &ReferenceGrid,
    method: Resampling,
) -> Result<Vec<f64>> {
    let profile = &source.profile;
    if profile.is_empty() {
        return Err(AlignError::Reprojection("input raster has no pixels".to_string()));
    }
    if source.data.len() != profile.len() {
        return Err(AlignError::Reprojection(format!(
            "source buffer holds {} samples, expected {}x{}",
            source.data.len(),
            profile.width,
            profile.height
        )));
    }
    let src_crs = profile
        .crs
        .as_ref()
        .ok_or_else(|| AlignError::Reprojection("input raster has no CRS".to_string()))?;
    let to_pixel = profile.transform.inverse().ok_or_else(|| {
        AlignError::Reprojection(format!(
            "input transform is not invertible: {}",
            profile.transform
        ))
    })?;
    let transformer = CoordTransformer::new(&target.crs, src_crs).map_err(|e| {
        AlignError::Reprojection(format!("incompatible CRS definitions: {}", e))
    })?;

    debug!(
        src_crs = %src_crs,
        dst_crs = %target.crs,
        identity = transformer.is_identity(),
        width = target.width,
        height = target.height,
        %method,
        "reprojecting"
    );

    let fill = profile.fill_value();
    let mut out = Vec::with_capacity(target.width * target.height);
    for row in 0..target.height {
        for col in 0..target.width {
            let (x, y) = target.transform.pixel_center(col, row);
            // Points outside the source projection's domain get the fill value.
            let value = transformer.transform(x, y).ok().and_then(|(sx, sy)| {
                let (px, py) = to_pixel.apply(sx, sy);
                match method {
                    Resampling::Bilinear => sample_bilinear(&source.data, profile, px, py),
                    Resampling::Nearest => sample_nearest(&source.data, profile, px, py),
                }
            });
            out.push(value.map_or(fill, |v| profile.dtype.coerce(v)));
        }
    }

    Ok(out)
}

/// True if the fractional pixel position lies outside the raster footprint.
#[inline]
fn outside(profile: &RasterProfile, px: f64, py: f64) -> bool {
    !(px >= 0.0 && py >= 0.0 && px <= profile.width as f64 && py <= profile.height as f64)
}

#[inline]
fn sample_nearest(data: &[f64], profile: &RasterProfile, px: f64, py: f64) -> Option<f64> {
    if outside(profile, px, py) {
        return None;
    }
    let col = (px.floor() as usize).min(profile.width - 1);
    let row = (py.floor() as usize).min(profile.height - 1);
    let value = data[row * profile.width + col];
    (!profile.is_missing(value)).then_some(value)
}

/// Bilinear interpolation at fractional pixel position `(px, py)`.
///
/// Sample centres sit at half-pixel offsets. Neighbours that fall outside
/// the grid or are missing are dropped and the remaining weights
/// renormalised.
#[inline]
fn sample_bilinear(data: &[f64], profile: &RasterProfile, px: f64, py: f64) -> Option<f64> {
    if outside(profile, px, py) {
        return None;
    }

    let fx = px - 0.5;
    let fy = py - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let dx = fx - x0;
    let dy = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let (w, h) = (profile.width as i64, profile.height as i64);

    let neighbours = [
        (x0, y0, (1.0 - dx) * (1.0 - dy)),
        (x0 + 1, y0, dx * (1.0 - dy)),
        (x0, y0 + 1, (1.0 - dx) * dy),
        (x0 + 1, y0 + 1, dx * dy),
    ];

    let mut sum = 0.0;
    let mut weight_sum = 0.0;
    for (cx, cy, weight) in neighbours {
        if weight <= 0.0 || cx < 0 || cy < 0 || cx >= w || cy >= h {
            continue;
        }
        let value = data[(cy * w + cx) as usize];
        if profile.is_missing(value) {
            continue;
        }
        sum += value * weight;
        weight_sum += weight;
    }

    (weight_sum > 0.0).then(|| sum / weight_sum)
}

/// Resample `source` onto the grid of the DEM at `dem_path` and write the
/// result to `output_path`.
///
/// The written profile takes driver, shape, transform and CRS from the DEM,
/// fixes the band count at 1 and keeps the source data type and nodata.
///
/// # Errors
///
/// [`AlignError::Reprojection`] if the DEM cannot be read or the
/// reprojection fails; [`AlignError::Write`] if the output cannot be written.
pub fn align_to_reference<P: AsRef<Path>, Q: AsRef<Path>>(
    source: &SourceRaster,
    dem_path: P,
    output_path: Q,
    method: Resampling,
) -> Result<ResampledRaster> {
    let output_path = output_path.as_ref();
    let grid = reference_grid(dem_path)?;
    let data = reproject(source, &grid, method)?;
    let profile = source.profile.retarget(&grid);

    geotiff::write(output_path, &profile, &data).map_err(|e| AlignError::Write {
        path: output_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    info!(
        path = %output_path.display(),
        width = profile.width,
        height = profile.height,
        crs = %grid.crs,
        dtype = %profile.dtype,
        "resampled raster written"
    );

    Ok(ResampledRaster {
        grid,
        profile,
        data,
    })
}
