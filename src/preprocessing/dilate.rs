//! Nodata filling by dilation
//!
//! Every missing cell looks outward along the eight grid directions for the nearest
//! valid cell within `max_distance` cells, and takes the inverse-square-distance
//! weighted mean of what it finds. Optional smoothing passes then replace each filled
//! cell by the mean of its 3x3 neighbourhood. Cells with nothing in reach stay nodata.

use ndarray::{Array2, Zip};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::is_missing;
use crate::preprocessing::grid::{GridMetadata, RasterLayer};
use crate::preprocessing::operation::BandOperation;

/// Search distance in cells when a step does not set one.
pub const DEFAULT_MAX_DISTANCE: f64 = 100.0;

const DIRECTIONS: [(isize, isize); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dilation {
    /// Furthest a valid cell may be, in cells, to contribute to a fill.
    pub max_distance: f64,
    pub smoothing_iterations: u32,
    /// Label rasters only grow their footprint: filled cells become 0.
    pub label: bool,
}

impl Default for Dilation {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            smoothing_iterations: 0,
            label: false,
        }
    }
}

impl Dilation {
    pub fn new(max_distance: f64, smoothing_iterations: u32, label: bool) -> Result<Self> {
        if !max_distance.is_finite() || max_distance <= 0.0 {
            return Err(ProcessingError::config(format!(
                "dilation distance must be positive and finite, got {max_distance}"
            )));
        }
        Ok(Self {
            max_distance,
            smoothing_iterations,
            label,
        })
    }

    fn interpolate(
        &self,
        band: &Array2<f64>,
        valid: &Array2<bool>,
        row: usize,
        col: usize,
    ) -> Option<f64> {
        let (rows, cols) = band.dim();
        let mut sum = 0.0;
        let mut weights = 0.0;
        for (dr, dc) in DIRECTIONS {
            let step = ((dr * dr + dc * dc) as f64).sqrt();
            for k in 1.. {
                let distance = k as f64 * step;
                if distance > self.max_distance {
                    break;
                }
                let r = row as isize + dr * k;
                let c = col as isize + dc * k;
                if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                    break;
                }
                let (r, c) = (r as usize, c as usize);
                if valid[[r, c]] {
                    let weight = 1.0 / (distance * distance);
                    sum += weight * band[[r, c]];
                    weights += weight;
                    break;
                }
            }
        }
        (weights > 0.0).then(|| sum / weights)
    }
}

impl BandOperation for Dilation {
    fn name(&self) -> &'static str {
        "dilate"
    }

    fn apply(&self, band: &Array2<f64>, meta: &GridMetadata) -> Result<Array2<f64>> {
        let nodata = meta.nodata;
        let valid = band.mapv(|v| !is_missing(v, nodata));
        if !valid.iter().any(|&v| v) {
            return Err(ProcessingError::data("band has no valid cells to dilate from"));
        }

        let mut out = band.mapv(|v| if is_missing(v, nodata) { f64::NAN } else { v });
        let mut filled = Array2::from_elem(band.dim(), false);
        for ((row, col), &is_valid) in valid.indexed_iter() {
            if is_valid {
                continue;
            }
            if let Some(value) = self.interpolate(band, &valid, row, col) {
                out[[row, col]] = value;
                filled[[row, col]] = true;
            }
        }

        for _ in 0..self.smoothing_iterations {
            out = smooth(&out, &filled);
        }
        if self.label {
            Zip::from(&mut out).and(&filled).for_each(|cell, &was_filled| {
                if was_filled {
                    *cell = 0.0;
                }
            });
        }

        debug!(
            filled = filled.iter().filter(|&&f| f).count(),
            remaining = out.iter().filter(|v| v.is_nan()).count(),
            max_distance = self.max_distance,
            "Dilated band"
        );
        Ok(out)
    }

    fn retires_nodata(&self) -> bool {
        true
    }
}

/// One 3x3 mean pass over the filled cells; original values are left alone.
fn smooth(values: &Array2<f64>, filled: &Array2<bool>) -> Array2<f64> {
    let (rows, cols) = values.dim();
    let mut out = values.clone();
    for ((row, col), &was_filled) in filled.indexed_iter() {
        if !was_filled {
            continue;
        }
        let mut sum = 0.0;
        let mut count = 0usize;
        for r in row.saturating_sub(1)..=(row + 1).min(rows - 1) {
            for c in col.saturating_sub(1)..=(col + 1).min(cols - 1) {
                let value = values[[r, c]];
                if !value.is_nan() {
                    sum += value;
                    count += 1;
                }
            }
        }
        if count > 0 {
            out[[row, col]] = sum / count as f64;
        }
    }
    out
}

/// Fills nodata cells of every band from nearby valid cells.
pub fn dilate(layer: &RasterLayer, params: Dilation) -> Result<RasterLayer> {
    layer.map_bands(&params)
}
