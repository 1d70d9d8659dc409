//! Burning vector features into a template grid.
//!
//! Coverage follows the usual centre rule: a polygon covers the cells whose centres it
//! contains, a line covers every cell it passes through, a point covers the cell it
//! falls in. Output is always registered to the template, whatever the features' extent.

use std::ops::Range;

use geo::{
    AffineTransform, BoundingRect, Contains, Coord, Geometry, Intersects, LineString, Point,
    Polygon, Rect,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::grid::{ElementType, GeoTransform, GridMetadata, RasterLayer};
use crate::preprocessing::normalize::{normalize, NormalizeOptions};
use crate::preprocessing::vector::types::{Feature, VectorLayer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterizeMode {
    /// 1 where any feature covers the cell, 0 elsewhere.
    Binary,
    /// One binary band per distinct value of a column.
    Categorical,
    /// The numeric value of a column; uncovered cells are nodata.
    Continuous,
}

impl RasterizeMode {
    pub fn needs_column(self) -> bool {
        !matches!(self, RasterizeMode::Binary)
    }
}

/// How a cell covered by several features with different values is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Value of the last feature in layer order.
    LastWins,
    /// Largest value; independent of feature order.
    #[default]
    Max,
    /// Smallest value; independent of feature order.
    Min,
    /// Conflicting values fail the layer with a `DataError`.
    Error,
}

impl OverlapPolicy {
    fn resolve(self, current: f64, incoming: f64) -> Option<f64> {
        match self {
            OverlapPolicy::LastWins => Some(incoming),
            OverlapPolicy::Max => Some(current.max(incoming)),
            OverlapPolicy::Min => Some(current.min(incoming)),
            OverlapPolicy::Error if current == incoming => Some(current),
            OverlapPolicy::Error => None,
        }
    }
}

/// Rasterizes features onto the grid of `template`.
///
/// Cells where the template's first band is nodata are nodata in every output band.
pub struct Rasterizer<'a> {
    template: &'a RasterLayer,
    policy: OverlapPolicy,
}

impl<'a> Rasterizer<'a> {
    pub fn new(template: &'a RasterLayer) -> Self {
        Self {
            template,
            policy: OverlapPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn rasterize(
        &self,
        layer: &VectorLayer,
        mode: RasterizeMode,
        column: Option<&str>,
    ) -> Result<RasterLayer> {
        let required = || {
            column.ok_or_else(|| {
                ProcessingError::config(format!("{mode:?} rasterization requires a column"))
            })
        };
        match mode {
            RasterizeMode::Binary => self.binary(layer),
            RasterizeMode::Categorical => self.categorical(layer, required()?),
            RasterizeMode::Continuous => self.continuous(layer, required()?),
        }
    }

    pub fn binary(&self, layer: &VectorLayer) -> Result<RasterLayer> {
        self.check_crs(layer)?;
        let shapes: Vec<_> = layer.features.iter().enumerate().map(|(i, f)| (i, f, 1.0)).collect();
        let band = self.burn(&shapes, 0.0)?;
        self.finish(vec![band], vec![None], ElementType::UInt8)
    }

    /// One-hot encoding of `column`, one band per distinct value in sorted order,
    /// named `<column>_<value>`.
    pub fn categorical(&self, layer: &VectorLayer, column: &str) -> Result<RasterLayer> {
        self.check_crs(layer)?;
        self.check_column(layer, column)?;
        let categories = layer.distinct_values(column);
        if categories.is_empty() {
            return Err(ProcessingError::data(format!(
                "column '{column}' has no non-null values to encode"
            )));
        }
        debug!(column, categories = categories.len(), "Encoding categorical column");

        let mut bands = Vec::with_capacity(categories.len());
        let mut names = Vec::with_capacity(categories.len());
        for category in &categories {
            let shapes: Vec<_> = layer
                .features
                .iter()
                .enumerate()
                .filter(|(_, feature)| feature.attribute(column) == category)
                .map(|(i, f)| (i, f, 1.0))
                .collect();
            bands.push(self.burn(&shapes, 0.0)?);
            names.push(Some(format!("{column}_{category}")));
        }
        self.finish(bands, names, ElementType::UInt8)
    }

    pub fn continuous(&self, layer: &VectorLayer, column: &str) -> Result<RasterLayer> {
        self.check_crs(layer)?;
        self.check_column(layer, column)?;

        let mut shapes = Vec::with_capacity(layer.len());
        for (index, feature) in layer.features.iter().enumerate() {
            let value = feature.attribute(column);
            if value.is_null() {
                continue;
            }
            let number = value.as_f64().ok_or_else(|| {
                ProcessingError::data(format!(
                    "feature {} has non-numeric value '{value}' in column '{column}'",
                    feature.label(index)
                ))
            })?;
            shapes.push((index, feature, number));
        }

        let band = self.burn(&shapes, f64::NAN)?;
        self.finish(vec![band], vec![Some(column.to_string())], ElementType::Float64)
    }

    fn check_crs(&self, layer: &VectorLayer) -> Result<()> {
        match (&layer.crs, &self.template.meta().crs) {
            (Some(source), Some(target)) if source != target => Err(ProcessingError::config(format!(
                "vector layer '{}' is in {source} but the template is in {target}",
                layer.name
            ))),
            _ => Ok(()),
        }
    }

    fn check_column(&self, layer: &VectorLayer, column: &str) -> Result<()> {
        if layer.has_column(column) {
            Ok(())
        } else {
            Err(ProcessingError::config(format!(
                "vector layer '{}' has no column '{column}'",
                layer.name
            )))
        }
    }

    fn burn(&self, shapes: &[(usize, &Feature, f64)], background: f64) -> Result<Array2<f64>> {
        let meta = self.template.meta();
        let grid = PixelGrid::new(meta)?;
        let mut band = Array2::from_elem(meta.shape(), background);
        let mut written = Array2::from_elem(meta.shape(), false);
        let mut cells = Vec::new();

        for &(index, feature, value) in shapes {
            let Some(geometry) = &feature.geometry else {
                debug!(feature = %feature.label(index), "Skipping feature without geometry");
                continue;
            };
            cells.clear();
            grid.cover(geometry, &mut cells);
            cells.sort_unstable();
            cells.dedup();

            for &(row, col) in &cells {
                if !written[[row, col]] {
                    band[[row, col]] = value;
                    written[[row, col]] = true;
                    continue;
                }
                let current = band[[row, col]];
                band[[row, col]] = self.policy.resolve(current, value).ok_or_else(|| {
                    ProcessingError::data(format!(
                        "feature {} writes {value} over {current} at cell ({row}, {col})",
                        feature.label(index)
                    ))
                })?;
            }
        }

        let footprint = self.template.valid_mask();
        ndarray::Zip::from(&mut band).and(&footprint).for_each(|cell, &inside| {
            if !inside {
                *cell = f64::NAN;
            }
        });

        debug!(
            features = shapes.len(),
            covered = written.iter().filter(|&&w| w).count(),
            "Burned features"
        );
        Ok(band)
    }

    fn finish(
        &self,
        bands: Vec<Array2<f64>>,
        names: Vec<Option<String>>,
        dtype: ElementType,
    ) -> Result<RasterLayer> {
        let meta = self
            .template
            .meta()
            .grid_only()
            .with_dtype(dtype)
            .with_nodata(Some(f64::NAN));
        let layer = RasterLayer::new(bands, meta)?.with_band_names(names);
        Ok(normalize(layer, NormalizeOptions::default()))
    }
}

/// Maps world geometries onto cell indices of one grid.
pub(crate) struct PixelGrid {
    transform: GeoTransform,
    inverse: AffineTransform<f64>,
    width: usize,
    height: usize,
}

impl PixelGrid {
    pub(crate) fn new(meta: &GridMetadata) -> Result<Self> {
        Ok(Self {
            transform: meta.transform,
            inverse: meta.transform.inverse()?,
            width: meta.width,
            height: meta.height,
        })
    }

    fn cover(&self, geometry: &Geometry<f64>, cells: &mut Vec<(usize, usize)>) {
        match geometry {
            Geometry::Point(point) => self.cover_point(point, cells),
            Geometry::MultiPoint(points) => points.iter().for_each(|p| self.cover_point(p, cells)),
            Geometry::Line(line) => {
                self.cover_line(&LineString::from(vec![line.start, line.end]), cells)
            }
            Geometry::LineString(line) => self.cover_line(line, cells),
            Geometry::MultiLineString(lines) => {
                lines.iter().for_each(|l| self.cover_line(l, cells))
            }
            Geometry::Polygon(polygon) => self.cover_polygon(polygon, cells),
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().for_each(|p| self.cover_polygon(p, cells))
            }
            Geometry::Rect(rect) => self.cover_polygon(&rect.to_polygon(), cells),
            Geometry::Triangle(triangle) => self.cover_polygon(&triangle.to_polygon(), cells),
            Geometry::GeometryCollection(collection) => {
                collection.iter().for_each(|g| self.cover(g, cells))
            }
        }
    }

    /// Every cell whose footprint intersects `geometry`, edges included.
    pub(crate) fn cover_touched(&self, geometry: &Geometry<f64>, cells: &mut Vec<(usize, usize)>) {
        let window = geometry.bounding_rect().and_then(|rect| self.window(rect, 1));
        let Some((rows, cols)) = window else {
            return;
        };
        for row in rows {
            for col in cols.clone() {
                if geometry.intersects(&self.cell_polygon(row, col)) {
                    cells.push((row, col));
                }
            }
        }
    }

    fn cover_point(&self, point: &Point<f64>, cells: &mut Vec<(usize, usize)>) {
        let pixel = self.inverse.apply(point.0);
        let inside = (0.0..self.width as f64).contains(&pixel.x)
            && (0.0..self.height as f64).contains(&pixel.y);
        if inside {
            cells.push((pixel.y.floor() as usize, pixel.x.floor() as usize));
        }
    }

    fn cover_line(&self, line: &LineString<f64>, cells: &mut Vec<(usize, usize)>) {
        let Some((rows, cols)) = line.bounding_rect().and_then(|rect| self.window(rect, 1)) else {
            return;
        };
        for row in rows {
            for col in cols.clone() {
                if self.cell_polygon(row, col).intersects(line) {
                    cells.push((row, col));
                }
            }
        }
    }

    fn cover_polygon(&self, polygon: &Polygon<f64>, cells: &mut Vec<(usize, usize)>) {
        let window = polygon.bounding_rect().and_then(|rect| self.window(rect, 0));
        let Some((rows, cols)) = window else {
            return;
        };
        for row in rows {
            for col in cols.clone() {
                let (x, y) = self.transform.cell_center(col, row);
                if polygon.contains(&Point::new(x, y)) {
                    cells.push((row, col));
                }
            }
        }
    }

    /// Cell index ranges overlapping a world-space rectangle, padded by `pad` cells.
    fn window(&self, rect: Rect<f64>, pad: usize) -> Option<(Range<usize>, Range<usize>)> {
        let (min, max) = (rect.min(), rect.max());
        let corners = [
            min,
            max,
            Coord { x: min.x, y: max.y },
            Coord { x: max.x, y: min.y },
        ]
        .map(|corner| self.inverse.apply(corner));

        let (mut col_lo, mut col_hi, mut row_lo, mut row_hi) =
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for pixel in corners {
            col_lo = col_lo.min(pixel.x);
            col_hi = col_hi.max(pixel.x);
            row_lo = row_lo.min(pixel.y);
            row_hi = row_hi.max(pixel.y);
        }

        let clamp = |lo: f64, hi: f64, len: usize| -> Option<Range<usize>> {
            let start = (lo.floor() - pad as f64).max(0.0);
            let end = (hi.ceil() + pad as f64).min(len as f64);
            (start < end).then(|| start as usize..end as usize)
        };
        Some((clamp(row_lo, row_hi, self.height)?, clamp(col_lo, col_hi, self.width)?))
    }

    fn cell_polygon(&self, row: usize, col: usize) -> Polygon<f64> {
        let (c, r) = (col as f64, row as f64);
        let ring: Vec<Coord<f64>> = [(c, r), (c + 1.0, r), (c + 1.0, r + 1.0), (c, r + 1.0), (c, r)]
            .into_iter()
            .map(|(px, py)| {
                let (x, y) = self.transform.pixel_to_world(px, py);
                Coord { x, y }
            })
            .collect();
        Polygon::new(LineString::from(ring), vec![])
    }
}
