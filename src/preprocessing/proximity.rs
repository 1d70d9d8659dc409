//! Proximity rasters
//!
//! Euclidean distance, in CRS units, from every cell to the nearest cell holding a
//! target value. Uses the separable squared-distance transform of Felzenszwalb and
//! Huttenlocher: one 1-D lower-envelope pass along rows, then one along columns.

use ndarray::{Array2, Axis};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::is_missing;
use crate::preprocessing::grid::{GridMetadata, RasterLayer};
use crate::preprocessing::operation::BandOperation;

pub const DEFAULT_TARGET_VALUE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub target_value: f64,
}

impl Default for Proximity {
    fn default() -> Self {
        Self {
            target_value: DEFAULT_TARGET_VALUE,
        }
    }
}

impl Proximity {
    pub fn new(target_value: f64) -> Self {
        Self { target_value }
    }
}

impl BandOperation for Proximity {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn apply(&self, band: &Array2<f64>, meta: &GridMetadata) -> Result<Array2<f64>> {
        let nodata = meta.nodata;
        let mut squared = band.mapv(|x| {
            if !is_missing(x, nodata) && x == self.target_value {
                0.0
            } else {
                f64::INFINITY
            }
        });

        let targets = squared.iter().filter(|&&d| d == 0.0).count();
        if targets == 0 {
            return Err(ProcessingError::data(format!(
                "no cell holds the target value {}",
                self.target_value
            )));
        }

        let (x_size, y_size) = meta.transform.pixel_size();
        debug!(targets, x_size, y_size, "Computing distance transform");

        // Along each row, neighbouring cells are one cell width apart.
        distance_pass(&mut squared, Axis(1), x_size);
        distance_pass(&mut squared, Axis(0), y_size);

        let mut out = squared.mapv_into(f64::sqrt);
        ndarray::Zip::from(&mut out).and(band).for_each(|d, &x| {
            if is_missing(x, nodata) {
                *d = f64::NAN;
            }
        });
        Ok(out)
    }

    fn produces_float(&self) -> bool {
        true
    }
}

fn distance_pass(grid: &mut Array2<f64>, axis: Axis, spacing: f64) {
    let len = grid.len_of(axis);
    let mut line = vec![0.0; len];
    let mut result = vec![0.0; len];
    for mut lane in grid.lanes_mut(axis) {
        for (slot, &value) in line.iter_mut().zip(lane.iter()) {
            *slot = value;
        }
        lower_envelope(&line, spacing, &mut result);
        for (cell, &value) in lane.iter_mut().zip(result.iter()) {
            *cell = value;
        }
    }
}

/// 1-D squared distance transform of `f` with sample spacing `spacing`.
///
/// Sites with an infinite cost do not contribute; if none is finite, `out` is all infinity.
fn lower_envelope(f: &[f64], spacing: f64, out: &mut [f64]) {
    let position = |index: usize| index as f64 * spacing;
    let mut sites: Vec<usize> = Vec::with_capacity(f.len());
    // boundaries[i] is the left edge of the region where sites[i] is closest
    let mut boundaries: Vec<f64> = Vec::with_capacity(f.len());

    for (q, &cost) in f.iter().enumerate() {
        if !cost.is_finite() {
            continue;
        }
        let xq = position(q);
        loop {
            match (sites.last(), boundaries.last()) {
                (Some(&p), Some(&left)) => {
                    let xp = position(p);
                    let crossing = ((cost + xq * xq) - (f[p] + xp * xp)) / (2.0 * (xq - xp));
                    if crossing <= left {
                        sites.pop();
                        boundaries.pop();
                        continue;
                    }
                    sites.push(q);
                    boundaries.push(crossing);
                }
                _ => {
                    sites.push(q);
                    boundaries.push(f64::NEG_INFINITY);
                }
            }
            break;
        }
    }

    if sites.is_empty() {
        out.fill(f64::INFINITY);
        return;
    }

    let mut k = 0;
    for (p, slot) in out.iter_mut().enumerate() {
        let xp = position(p);
        while k + 1 < sites.len() && boundaries[k + 1] < xp {
            k += 1;
        }
        let offset = xp - position(sites[k]);
        *slot = offset * offset + f[sites[k]];
    }
}

/// Distance from every cell of each band to its nearest target cell.
pub fn proximity(layer: &RasterLayer, params: Proximity) -> Result<RasterLayer> {
    layer.map_bands(&params)
}
