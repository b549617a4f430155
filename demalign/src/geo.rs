//! Raster geometry: bounding boxes and affine pixel transforms.
//!
//! A [`GeoTransform`] maps pixel `(col, row)` positions to world coordinates
//! in the raster's CRS. Pixel `(0, 0)` is the **top-left corner** of the
//! top-left pixel, so the centre of that pixel is at `(0.5, 0.5)`.
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! For a north-up raster `b` and `d` are zero and `e` is negative.

use std::fmt;

/// A bounding box in the coordinates of some CRS.
///
/// For geographic CRSs `west`/`east` are longitudes and `south`/`north`
/// are latitudes, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum x (western edge).
    pub west: f64,
    /// Minimum y (southern edge).
    pub south: f64,
    /// Maximum x (eastern edge).
    pub east: f64,
    /// Maximum y (northern edge).
    pub north: f64,
}

impl Bounds {
    /// Create a new bounding box.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Smallest box containing all `points`.
    ///
    /// Returns `None` for an empty iterator or if any coordinate is not finite.
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<Self> {
        let mut bounds: Option<Bounds> = None;
        for (x, y) in points {
            if !x.is_finite() || !y.is_finite() {
                return None;
            }
            bounds = Some(match bounds {
                None => Bounds::new(x, y, x, y),
                Some(b) => Bounds::new(b.west.min(x), b.south.min(y), b.east.max(x), b.north.max(y)),
            });
        }
        bounds
    }

    /// Width of the box (east - west).
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height of the box (north - south).
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Check if a point lies inside the box (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.west && x <= self.east && y >= self.south && y <= self.north
    }

    /// Corners and edge midpoints, used when transforming the box to another CRS.
    pub fn outline(&self) -> [(f64, f64); 8] {
        let mid_x = (self.west + self.east) / 2.0;
        let mid_y = (self.south + self.north) / 2.0;
        [
            (self.west, self.north),
            (mid_x, self.north),
            (self.east, self.north),
            (self.east, mid_y),
            (self.east, self.south),
            (mid_x, self.south),
            (self.west, self.south),
            (self.west, mid_y),
        ]
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "west={}, south={}, east={}, north={}",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Six-parameter affine transform from pixel to world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// x pixel size (world units per column).
    pub a: f64,
    /// Row rotation term for x.
    pub b: f64,
    /// x of the top-left corner.
    pub c: f64,
    /// Column rotation term for y.
    pub d: f64,
    /// y pixel size (negative for north-up rasters).
    pub e: f64,
    /// y of the top-left corner.
    pub f: f64,
}

impl GeoTransform {
    /// Create a transform from its six coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform anchored at the top-left corner `(west, north)`.
    ///
    /// `x_res` and `y_res` are positive pixel sizes.
    pub fn from_origin(west: f64, north: f64, x_res: f64, y_res: f64) -> Self {
        Self::new(x_res, 0.0, west, 0.0, -y_res, north)
    }

    /// North-up transform that fits `width × height` pixels exactly into `bounds`.
    pub fn from_bounds(bounds: &Bounds, width: usize, height: usize) -> Self {
        Self::from_origin(
            bounds.west,
            bounds.north,
            bounds.width() / width as f64,
            bounds.height() / height as f64,
        )
    }

    /// Map a fractional pixel position to world coordinates.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// World coordinates of the centre of pixel `(col, row)`.
    #[inline]
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Determinant of the linear part; zero means the transform is degenerate.
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Inverse transform (world to pixel), or `None` if degenerate.
    pub fn inverse(&self) -> Option<GeoTransform> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;
        Some(GeoTransform::new(
            ia,
            ib,
            -(ia * self.c + ib * self.f),
            id,
            ie,
            -(id * self.c + ie * self.f),
        ))
    }

    /// True when there are no rotation terms.
    pub fn is_north_up(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    /// Extent of a `width × height` grid under this transform.
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];
        let xs = corners.iter().map(|p| p.0);
        let ys = corners.iter().map(|p| p.1);
        Bounds::new(
            xs.clone().fold(f64::INFINITY, f64::min),
            ys.clone().fold(f64::INFINITY, f64::min),
            xs.fold(f64::NEG_INFINITY, f64::max),
            ys.fold(f64::NEG_INFINITY, f64::max),
        )
    }
}

impl fmt::Display for GeoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|{}, {}, {}|\n|{}, {}, {}|",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_origin_pixel_center() {
        let t = GeoTransform::from_origin(10.0, 45.1, 0.01, 0.01);
        let (x, y) = t.pixel_center(0, 0);
        assert_relative_eq!(x, 10.005, epsilon = 1e-12);
        assert_relative_eq!(y, 45.095, epsilon = 1e-12);
    }

    #[test]
    fn test_bounds_north_up() {
        let t = GeoTransform::from_origin(10.0, 45.1, 0.01, 0.01);
        let b = t.bounds(10, 10);
        assert_relative_eq!(b.west, 10.0);
        assert_relative_eq!(b.east, 10.1, epsilon = 1e-12);
        assert_relative_eq!(b.south, 45.0, epsilon = 1e-12);
        assert_relative_eq!(b.north, 45.1);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = GeoTransform::new(2.0, 0.5, 100.0, 0.25, -3.0, 500.0);
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(7.25, 3.5);
        let (col, row) = inv.apply(x, y);
        assert_relative_eq!(col, 7.25, epsilon = 1e-9);
        assert_relative_eq!(row, 3.5, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_has_no_inverse() {
        let t = GeoTransform::new(0.0, 0.0, 1.0, 0.0, 0.0, 1.0);
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_from_bounds() {
        let b = Bounds::new(10.0, 45.0, 10.1, 45.1);
        let t = GeoTransform::from_bounds(&b, 20, 10);
        assert_relative_eq!(t.a, 0.005, epsilon = 1e-12);
        assert_relative_eq!(t.e, -0.01, epsilon = 1e-12);
        assert!(t.is_north_up());
    }

    #[test]
    fn test_bounds_from_points() {
        let b = Bounds::from_points([(1.0, 5.0), (-2.0, 3.0), (4.0, -1.0)]).unwrap();
        assert_eq!(b, Bounds::new(-2.0, -1.0, 4.0, 5.0));
        assert!(Bounds::from_points(Vec::new()).is_none());
        assert!(Bounds::from_points([(f64::NAN, 0.0)]).is_none());
    }

    #[test]
    fn test_contains() {
        let b = Bounds::new(10.0, 45.0, 10.1, 45.1);
        assert!(b.contains(10.05, 45.05));
        assert!(b.contains(10.0, 45.0));
        assert!(!b.contains(9.99, 45.05));
    }
}
