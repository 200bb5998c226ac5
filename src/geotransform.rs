//! Affine mapping between pixel indices and projected coordinates.
//!
//! Coefficients follow GDAL order `[x0, a, b, y0, d, e]`:
//!
//! ```text
//! x = x0 + col * a + row * b
//! y = y0 + col * d + row * e
//! ```
//!
//! Indices are always `(row, col)`, with `col` running along x and `row`
//! along y. Every caller in the crate uses this convention.

use crate::bbox::ProjectedExtent;
use crate::error::{DemError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    coefficients: [f64; 6],
}

impl GeoTransform {
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self { coefficients }
    }

    /// North-up transform with no rotation.
    pub fn north_up(x0: f64, y0: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new([x0, pixel_width, 0.0, y0, 0.0, -pixel_height])
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.coefficients
    }

    /// Projected coordinate of the fractional pixel position `(row, col)`.
    pub fn forward(&self, row: f64, col: f64) -> (f64, f64) {
        let [x0, a, b, y0, d, e] = self.coefficients;
        (x0 + col * a + row * b, y0 + col * d + row * e)
    }

    /// Projected coordinate of the centre of pixel `(row, col)`.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.forward(row as f64 + 0.5, col as f64 + 0.5)
    }

    pub fn invert(&self) -> Result<InverseGeoTransform> {
        let [x0, a, b, y0, d, e] = self.coefficients;
        let det = a * e - b * d;
        if det == 0.0 || !det.is_finite() {
            return Err(DemError::SingularGeoTransform(self.coefficients));
        }

        Ok(InverseGeoTransform {
            x0,
            y0,
            inv: [e / det, -b / det, -d / det, a / det],
        })
    }

    /// Bounding extent of a `rows x cols` grid, taken over all four corners so
    /// rotated and south-up grids are handled.
    pub fn extent(&self, rows: usize, cols: usize) -> ProjectedExtent {
        let (rows, cols) = (rows as f64, cols as f64);
        let corners = [
            self.forward(0.0, 0.0),
            self.forward(0.0, cols),
            self.forward(rows, 0.0),
            self.forward(rows, cols),
        ];

        let mut extent = ProjectedExtent {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            extent.x_min = extent.x_min.min(x);
            extent.x_max = extent.x_max.max(x);
            extent.y_min = extent.y_min.min(y);
            extent.y_max = extent.y_max.max(y);
        }
        extent
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        Self::new(coefficients)
    }
}

/// Precomputed inverse of a [`GeoTransform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseGeoTransform {
    x0: f64,
    y0: f64,
    inv: [f64; 4],
}

impl InverseGeoTransform {
    /// Fractional `(row, col)` of the projected coordinate `(x, y)`.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.x0;
        let dy = y - self.y0;
        let col = self.inv[0] * dx + self.inv[1] * dy;
        let row = self.inv[2] * dx + self.inv[3] * dy;
        (row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landsat_like() -> GeoTransform {
        GeoTransform::new([500000.0, 30.0, 0.0, 4000000.0, 0.0, -30.0])
    }

    #[test]
    fn test_forward_and_inverse() {
        let gt = landsat_like();
        let (x, y) = gt.forward(10.0, 20.0);
        assert_eq!((x, y), (500600.0, 3999700.0));

        let (row, col) = gt.invert().unwrap().apply(x, y);
        assert!((row - 10.0).abs() < 1e-9);
        assert!((col - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_pixel_center() {
        let gt = landsat_like();
        assert_eq!(gt.pixel_center(0, 0), (500015.0, 3999985.0));
    }

    #[test]
    fn test_rotated_inverse() {
        let gt = GeoTransform::new([100.0, 2.0, 0.5, 200.0, 0.25, -3.0]);
        let inv = gt.invert().unwrap();
        for (row, col) in [(0.0, 0.0), (3.5, 7.25), (100.0, 1.0)] {
            let (x, y) = gt.forward(row, col);
            let (r, c) = inv.apply(x, y);
            assert!((r - row).abs() < 1e-9, "row {} != {}", r, row);
            assert!((c - col).abs() < 1e-9, "col {} != {}", c, col);
        }
    }

    #[test]
    fn test_singular_transform() {
        let gt = GeoTransform::new([0.0, 1.0, 2.0, 0.0, 2.0, 4.0]);
        assert!(matches!(
            gt.invert(),
            Err(DemError::SingularGeoTransform(_))
        ));
    }

    #[test]
    fn test_extent() {
        let extent = landsat_like().extent(100, 200);
        assert_eq!(extent.x_min, 500000.0);
        assert_eq!(extent.x_max, 506000.0);
        assert_eq!(extent.y_min, 3997000.0);
        assert_eq!(extent.y_max, 4000000.0);
    }
}
