//! In-memory raster types used by the alignment pipeline.
//!
//! Samples of every supported pixel type are held as `f64` in row-major
//! order (row 0 is the top of the image). The original pixel type is kept
//! in the [`RasterProfile`] so output files are written with the same type
//! the input had.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::crs::Crs;
use crate::geo::{Bounds, GeoTransform};

/// Name of the only output format this crate writes.
pub const GTIFF_DRIVER: &str = "GTiff";

/// Pixel data type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Conventional lowercase name (e.g. `"float32"`).
    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::Int8 => "int8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::UInt32 => "uint32",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// True for floating-point types, which can represent NaN.
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Representable range of the type.
    pub fn range(&self) -> (f64, f64) {
        match self {
            DataType::UInt8 => (u8::MIN as f64, u8::MAX as f64),
            DataType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            DataType::UInt16 => (u16::MIN as f64, u16::MAX as f64),
            DataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::UInt32 => (u32::MIN as f64, u32::MAX as f64),
            DataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Bring an interpolated value into this type's domain.
    ///
    /// Integer types are rounded to nearest and clamped to their range;
    /// float types pass through unchanged (NaN included).
    pub fn coerce(&self, value: f64) -> f64 {
        if self.is_float() {
            return value;
        }
        let (min, max) = self.range();
        value.round().clamp(min, max)
    }

    /// Fill value for pixels without data when no nodata value is declared.
    pub fn default_fill(&self) -> f64 {
        if self.is_float() {
            f64::NAN
        } else {
            0.0
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uint8" => Ok(DataType::UInt8),
            "int8" => Ok(DataType::Int8),
            "uint16" => Ok(DataType::UInt16),
            "int16" => Ok(DataType::Int16),
            "uint32" => Ok(DataType::UInt32),
            "int32" => Ok(DataType::Int32),
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            other => Err(format!("unknown data type: {}", other)),
        }
    }
}

/// Format-level attributes needed to write a compatible raster file.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    /// Output format name.
    pub driver: String,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Number of bands.
    pub count: u16,
    /// Pixel data type.
    pub dtype: DataType,
    /// Coordinate reference system, if the file declares one.
    pub crs: Option<Crs>,
    /// Pixel-to-world transform.
    pub transform: GeoTransform,
    /// Declared nodata value, if any.
    pub nodata: Option<f64>,
}

impl RasterProfile {
    /// Spatial extent of the raster in its own CRS.
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width, self.height)
    }

    /// Number of pixels per band.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// True if the raster has no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `value` marks a missing sample (NaN or the declared nodata value).
    #[inline]
    pub fn is_missing(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| value == nd)
    }

    /// Fill value for output pixels that receive no data, representable in
    /// this profile's data type.
    pub fn fill_value(&self) -> f64 {
        self.nodata
            .map_or_else(|| self.dtype.default_fill(), |v| self.dtype.coerce(v))
    }

    /// Profile for writing this raster's data onto `grid`.
    ///
    /// Driver, shape, transform and CRS come from the grid; the band count is
    /// fixed at 1; data type and nodata are kept, with nodata coerced to the
    /// data type so the tag matches the filled pixels.
    pub fn retarget(&self, grid: &ReferenceGrid) -> RasterProfile {
        RasterProfile {
            driver: GTIFF_DRIVER.to_string(),
            width: grid.width,
            height: grid.height,
            count: 1,
            dtype: self.dtype,
            crs: Some(grid.crs.clone()),
            transform: grid.transform,
            nodata: self.nodata.map(|v| self.dtype.coerce(v)),
        }
    }
}

/// The caller-supplied single-band raster, read once at pipeline start.
#[derive(Debug, Clone)]
pub struct SourceRaster {
    /// Where the raster was read from.
    pub path: PathBuf,
    /// Metadata profile of the file.
    pub profile: RasterProfile,
    /// Band 1 samples, row-major.
    pub data: Vec<f64>,
}

impl SourceRaster {
    /// Spatial extent in the raster's CRS.
    pub fn bounds(&self) -> Bounds {
        self.profile.bounds()
    }

    /// Pixel data type of band 1.
    pub fn dtype(&self) -> DataType {
        self.profile.dtype
    }

    /// Number of non-missing samples.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.profile.is_missing(**v)).count()
    }
}

/// Grid geometry of the reference DEM: the target of the resampling.
///
/// The DEM's elevation values are never read; only where its pixels are.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    /// Pixel-to-world transform.
    pub transform: GeoTransform,
    /// CRS of the grid.
    pub crs: Crs,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl ReferenceGrid {
    /// `(rows, columns)` of the grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Spatial extent of the grid.
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width, self.height)
    }
}

/// Source samples re-interpolated onto a reference grid.
#[derive(Debug, Clone)]
pub struct ResampledRaster {
    /// The grid the samples were interpolated onto.
    pub grid: ReferenceGrid,
    /// Updated profile (target geometry, source data type).
    pub profile: RasterProfile,
    /// Resampled samples, row-major, already coerced to `profile.dtype`.
    pub data: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(dtype: DataType, nodata: Option<f64>) -> RasterProfile {
        RasterProfile {
            driver: GTIFF_DRIVER.to_string(),
            width: 4,
            height: 2,
            count: 1,
            dtype,
            crs: Some(Crs::wgs84()),
            transform: GeoTransform::from_origin(10.0, 45.1, 0.025, 0.05),
            nodata,
        }
    }

    #[test]
    fn test_coerce_integer_types() {
        assert_eq!(DataType::UInt8.coerce(12.6), 13.0);
        assert_eq!(DataType::UInt8.coerce(-4.0), 0.0);
        assert_eq!(DataType::UInt8.coerce(300.0), 255.0);
        assert_eq!(DataType::Int16.coerce(-40000.0), -32768.0);
        assert_eq!(DataType::Float32.coerce(1.25), 1.25);
        assert!(DataType::Float64.coerce(f64::NAN).is_nan());
    }

    #[test]
    fn test_data_type_names() {
        for dtype in [
            DataType::UInt8,
            DataType::Int8,
            DataType::UInt16,
            DataType::Int16,
            DataType::UInt32,
            DataType::Int32,
            DataType::Float32,
            DataType::Float64,
        ] {
            assert_eq!(dtype.name().parse::<DataType>().unwrap(), dtype);
        }
        assert!("complex64".parse::<DataType>().is_err());
    }

    #[test]
    fn test_is_missing() {
        let p = profile(DataType::Float32, Some(-9999.0));
        assert!(p.is_missing(f64::NAN));
        assert!(p.is_missing(-9999.0));
        assert!(!p.is_missing(0.0));

        let p = profile(DataType::Float32, None);
        assert!(!p.is_missing(-9999.0));
    }

    #[test]
    fn test_fill_value() {
        assert!(profile(DataType::Float32, None).fill_value().is_nan());
        assert_eq!(profile(DataType::Int16, None).fill_value(), 0.0);
        assert_eq!(profile(DataType::Int16, Some(-32768.0)).fill_value(), -32768.0);
    }

    #[test]
    fn test_retarget_takes_geometry_from_grid() {
        let src = RasterProfile {
            count: 3,
            driver: "COG".to_string(),
            ..profile(DataType::Int16, Some(-1.0))
        };
        let grid = ReferenceGrid {
            transform: GeoTransform::from_origin(500_000.0, 5_000_000.0, 30.0, 30.0),
            crs: Crs::Epsg(32632),
            width: 7,
            height: 9,
        };

        let out = src.retarget(&grid);
        assert_eq!(out.driver, GTIFF_DRIVER);
        assert_eq!((out.width, out.height), (7, 9));
        assert_eq!(out.transform, grid.transform);
        assert_eq!(out.crs, Some(Crs::Epsg(32632)));
        assert_eq!(out.count, 1);
        assert_eq!(out.dtype, DataType::Int16);
        assert_eq!(out.nodata, Some(-1.0));
    }

    #[test]
    fn test_out_of_range_nodata_is_coerced() {
        let src = profile(DataType::UInt16, Some(-9999.0));
        assert_eq!(src.fill_value(), 0.0);

        let grid = ReferenceGrid {
            transform: GeoTransform::from_origin(10.0, 45.1, 0.1, 0.1),
            crs: Crs::wgs84(),
            width: 1,
            height: 1,
        };
        assert_eq!(src.retarget(&grid).nodata, Some(0.0));
        assert!(profile(DataType::Float32, None).fill_value().is_nan());
    }

    #[test]
    fn test_source_valid_count() {
        let raster = SourceRaster {
            path: PathBuf::from("in.tif"),
            profile: profile(DataType::Float32, Some(-9999.0)),
            data: vec![1.0, f64::NAN, -9999.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        };
        assert_eq!(raster.valid_count(), 6);
        assert_eq!(raster.dtype(), DataType::Float32);
    }
}
