//! Spatial registration of a raster grid.

use geo::{AffineTransform, Coord};
use serde::{Deserialize, Serialize};

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::grid::crs::Crs;
use crate::preprocessing::grid::types::ElementType;

/// Affine pixel-to-world mapping.
///
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`, where `(col, row)`
/// addresses the upper-left corner of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform from the upper-left corner and positive cell sizes.
    pub fn from_origin(west: f64, north: f64, x_size: f64, y_size: f64) -> Self {
        Self::new(x_size, 0.0, west, 0.0, -y_size, north)
    }

    pub fn affine(&self) -> AffineTransform<f64> {
        AffineTransform::new(self.a, self.b, self.c, self.d, self.e, self.f)
    }

    /// World-to-pixel mapping.
    pub fn inverse(&self) -> Result<AffineTransform<f64>> {
        let coefficients = [self.a, self.b, self.c, self.d, self.e, self.f];
        if coefficients.iter().any(|v| !v.is_finite()) {
            return Err(ProcessingError::data(format!(
                "transform {self:?} has non-finite coefficients"
            )));
        }
        self.affine()
            .inverse()
            .ok_or_else(|| ProcessingError::data(format!("transform {self:?} is not invertible")))
    }

    pub fn is_north_up(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    #[inline]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let world = self.affine().apply(Coord { x: col, y: row });
        (world.x, world.y)
    }

    /// World coordinates of a cell's centre.
    #[inline]
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Transform of the sub-grid whose upper-left cell is `(col, row)` of this one.
    pub fn shifted(&self, col: usize, row: usize) -> GeoTransform {
        let (c, f) = self.pixel_to_world(col as f64, row as f64);
        GeoTransform { c, f, ..*self }
    }

    /// Cell width and height in CRS units.
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.a.hypot(self.d), self.b.hypot(self.e))
    }
}

/// Everything needed to place a raster's cells in the world and to interpret their values.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMetadata {
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
    pub width: usize,
    pub height: usize,
    pub count: usize,
    pub dtype: ElementType,
    pub nodata: Option<f64>,
}

impl GridMetadata {
    pub fn new(transform: GeoTransform, crs: Option<Crs>, width: usize, height: usize) -> Self {
        Self {
            transform,
            crs,
            width,
            height,
            count: 1,
            dtype: ElementType::Float64,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_dtype(mut self, dtype: ElementType) -> Self {
        self.dtype = dtype;
        self
    }

    /// `(rows, cols)`, the ndarray shape of each band.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Two grids are aligned when transform, shape and CRS are identical.
    pub fn is_aligned_with(&self, other: &GridMetadata) -> bool {
        self.transform == other.transform
            && self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
    }

    /// Copy of the spatial registration with band-specific fields reset.
    pub fn grid_only(&self) -> GridMetadata {
        GridMetadata::new(self.transform, self.crs.clone(), self.width, self.height)
    }

    /// `(min_x, min_y, max_x, max_y)` of the grid footprint.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let corners = [
            self.transform.pixel_to_world(0.0, 0.0),
            self.transform.pixel_to_world(self.width as f64, 0.0),
            self.transform.pixel_to_world(0.0, self.height as f64),
            self.transform.pixel_to_world(self.width as f64, self.height as f64),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}
