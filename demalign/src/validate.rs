//! Input validation: open the caller's raster and reject unusable ones.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{AlignError, Result};
use crate::geotiff;
use crate::raster::SourceRaster;

/// Open the raster at `path` and read band 1 into memory.
///
/// # Errors
///
/// * [`AlignError::Open`] if the file is missing, unreadable, not a
///   GeoTIFF, has no pixels, or uses an unsupported pixel type.
/// * [`AlignError::AllMissing`] if every sample of band 1 is NaN.
pub fn open_source<P: AsRef<Path>>(path: P) -> Result<SourceRaster> {
    let path = path.as_ref();

    let (profile, data) = geotiff::read(path).map_err(|e| AlignError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    debug!(
        path = %path.display(),
        width = profile.width,
        height = profile.height,
        dtype = %profile.dtype,
        "opened input raster"
    );

    if data.iter().all(|v| v.is_nan()) {
        return Err(AlignError::AllMissing {
            path: path.to_path_buf(),
        });
    }

    let raster = SourceRaster {
        path: path.to_path_buf(),
        profile,
        data,
    };

    info!(
        path = %path.display(),
        bounds = %raster.bounds(),
        crs = raster.profile.crs.as_ref().map(|c| c.to_string()).unwrap_or_default(),
        "input raster validated"
    );

    Ok(raster)
}
