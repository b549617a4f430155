//! Coordinate reference systems and coordinate transforms.
//!
//! Rasters identify their CRS either by EPSG code (the usual case for
//! GeoTIFFs, stored in the GeoKey directory) or by an explicit PROJ string.
//! Transforms are done with [`proj4rs`], a pure-Rust PROJ.4 port, so no
//! system PROJ/GDAL installation is needed.

use std::fmt;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use thiserror::Error;

use crate::geo::Bounds;

/// EPSG code of WGS84 geographic coordinates (longitude/latitude).
pub const EPSG_WGS84: u16 = 4326;

/// EPSG code of Web Mercator.
pub const EPSG_WEB_MERCATOR: u16 = 3857;

/// Errors raised while resolving or applying a CRS.
#[derive(Error, Debug)]
pub enum CrsError {
    /// No PROJ definition is known for this CRS.
    #[error("unsupported CRS: {0}")]
    Unsupported(String),

    /// The PROJ definition could not be parsed.
    #[error("invalid CRS definition for {crs}: {reason}")]
    Invalid { crs: String, reason: String },

    /// A point could not be transformed.
    #[error("coordinate transform {from} -> {to} failed at ({x}, {y}): {reason}")]
    Transform {
        from: String,
        to: String,
        x: f64,
        y: f64,
        reason: String,
    },
}

/// A coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    /// A CRS identified by its EPSG code.
    Epsg(u16),
    /// A user-defined CRS given as a PROJ.4 string.
    Proj(String),
}

impl Crs {
    /// WGS84 longitude/latitude.
    pub fn wgs84() -> Self {
        Crs::Epsg(EPSG_WGS84)
    }

    /// EPSG code, if this CRS has one.
    pub fn epsg(&self) -> Option<u16> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Proj(_) => None,
        }
    }

    /// PROJ.4 definition for this CRS, if known.
    pub fn proj_string(&self) -> Option<String> {
        match self {
            Crs::Epsg(code) => epsg_proj_string(*code),
            Crs::Proj(s) => Some(s.clone()),
        }
    }

    /// True if coordinates are longitude/latitude in degrees.
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Epsg(code) => is_geographic_epsg(*code),
            Crs::Proj(s) => s.contains("+proj=longlat") || s.contains("+proj=latlong"),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Proj(s) => f.write_str(s),
        }
    }
}

/// PROJ.4 definition of an EPSG code.
///
/// Covers the geographic CRSs DEM services deliver, Web Mercator, ETRS89-LAEA
/// and every WGS84 UTM zone.
pub fn epsg_proj_string(code: u16) -> Option<String> {
    let s = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs",
        4269 => "+proj=longlat +datum=NAD83 +no_defs",
        4258 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs",
        3857 => {
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
        }
        3035 => {
            "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        32601..=32660 => {
            return Some(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                code - 32600
            ))
        }
        32701..=32760 => {
            return Some(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                code - 32700
            ))
        }
        _ => return None,
    };
    Some(s.to_string())
}

/// True for the geographic EPSG codes known to [`epsg_proj_string`].
pub fn is_geographic_epsg(code: u16) -> bool {
    matches!(code, 4326 | 4269 | 4258)
}

/// Reusable point transformer between two CRSs.
///
/// Identical CRSs short-circuit to the identity, so rasters in a CRS without
/// a known PROJ definition can still be resampled onto a grid in the same CRS.
pub struct CoordTransformer {
    from: Crs,
    to: Crs,
    /// `None` when `from == to`.
    projs: Option<(Proj, Proj)>,
    from_geographic: bool,
    to_geographic: bool,
}

impl fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("identity", &self.projs.is_none())
            .finish_non_exhaustive()
    }
}

impl CoordTransformer {
    /// Create a transformer from `from` coordinates to `to` coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if either CRS has no known PROJ definition or the
    /// definition cannot be parsed (unless the two CRSs are identical).
    pub fn new(from: &Crs, to: &Crs) -> Result<Self, CrsError> {
        let projs = if from == to {
            None
        } else {
            Some((build_proj(from)?, build_proj(to)?))
        };

        Ok(Self {
            from: from.clone(),
            to: to.clone(),
            projs,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
        })
    }

    /// True if no transformation is applied.
    pub fn is_identity(&self) -> bool {
        self.projs.is_none()
    }

    /// Transform a single point.
    ///
    /// Geographic coordinates are in degrees on both sides.
    #[inline]
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        let Some((src, dst)) = &self.projs else {
            return Ok((x, y));
        };

        let mut point = if self.from_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(src, dst, &mut point).map_err(|e| CrsError::Transform {
            from: self.from.to_string(),
            to: self.to.to_string(),
            x,
            y,
            reason: format!("{:?}", e),
        })?;

        let out = if self.to_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out.0.is_finite() || !out.1.is_finite() {
            return Err(CrsError::Transform {
                from: self.from.to_string(),
                to: self.to.to_string(),
                x,
                y,
                reason: "result is not finite".to_string(),
            });
        }

        Ok(out)
    }

    /// Transform a bounding box by taking the envelope of its transformed outline.
    pub fn transform_bounds(&self, bounds: &Bounds) -> Result<Bounds, CrsError> {
        if self.is_identity() {
            return Ok(*bounds);
        }
        let points = bounds
            .outline()
            .iter()
            .map(|&(x, y)| self.transform(x, y))
            .collect::<Result<Vec<_>, _>>()?;

        Bounds::from_points(points).ok_or_else(|| CrsError::Transform {
            from: self.from.to_string(),
            to: self.to.to_string(),
            x: bounds.west,
            y: bounds.north,
            reason: "bounds are not finite".to_string(),
        })
    }
}

fn build_proj(crs: &Crs) -> Result<Proj, CrsError> {
    let definition = crs
        .proj_string()
        .ok_or_else(|| CrsError::Unsupported(crs.to_string()))?;
    Proj::from_proj_string(&definition).map_err(|e| CrsError::Invalid {
        crs: crs.to_string(),
        reason: format!("{:?}", e),
    })
}
