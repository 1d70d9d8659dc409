//! Clipping to an area of interest
//!
//! Cells touched by any AOI geometry keep their values and every other cell becomes
//! nodata. With `crop`, the grid is also cut down to the window of touched cells, so
//! the output transform moves to the window's upper-left corner.

use ndarray::{s, Array2};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::is_missing;
use crate::preprocessing::grid::RasterLayer;
use crate::preprocessing::normalize::{normalize, NormalizeOptions};
use crate::preprocessing::vector::rasterize::PixelGrid;
use crate::preprocessing::vector::{prepare_vector_layer, VectorLayer};

pub fn clip(layer: &RasterLayer, aoi: &VectorLayer, crop: bool) -> Result<RasterLayer> {
    let meta = layer.meta();
    let aoi = prepare_vector_layer(aoi, meta, None)?;
    let grid = PixelGrid::new(meta)?;

    let mut cells = Vec::new();
    for geometry in aoi.features.iter().filter_map(|f| f.geometry.as_ref()) {
        grid.cover_touched(geometry, &mut cells);
    }
    if cells.is_empty() {
        return Err(ProcessingError::data(format!(
            "area of interest '{}' does not overlap the raster",
            aoi.name
        )));
    }

    let mut inside = Array2::from_elem(meta.shape(), false);
    for &(row, col) in &cells {
        inside[[row, col]] = true;
    }

    let (rows, cols) = if crop {
        let span = |pick: fn(&(usize, usize)) -> usize| {
            cells.iter().map(pick).fold((usize::MAX, 0), |(lo, hi), i| (lo.min(i), hi.max(i)))
        };
        let (row_lo, row_hi) = span(|&(row, _)| row);
        let (col_lo, col_hi) = span(|&(_, col)| col);
        (row_lo..row_hi + 1, col_lo..col_hi + 1)
    } else {
        (0..meta.height, 0..meta.width)
    };

    let nodata = meta.nodata;
    let inside = inside.slice(s![rows.clone(), cols.clone()]);
    let bands = layer
        .bands()
        .iter()
        .map(|band| {
            let mut clipped = band.slice(s![rows.clone(), cols.clone()]).to_owned();
            ndarray::Zip::from(&mut clipped).and(&inside).for_each(|cell, &keep| {
                if !keep || is_missing(*cell, nodata) {
                    *cell = f64::NAN;
                }
            });
            clipped
        })
        .collect();

    let mut out_meta = meta.clone();
    out_meta.transform = meta.transform.shifted(cols.start, rows.start);
    out_meta.width = cols.len();
    out_meta.height = rows.len();
    out_meta.nodata = Some(f64::NAN);
    debug!(
        touched = inside.iter().filter(|&&k| k).count(),
        width = out_meta.width,
        height = out_meta.height,
        crop,
        "Clipped layer to area of interest"
    );

    let clipped = RasterLayer::new(bands, out_meta)?.with_band_names(layer.band_names().to_vec());
    Ok(normalize(clipped, NormalizeOptions::default()))
}
