//! Outlier clipping

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::{self, is_missing};
use crate::preprocessing::grid::{GridMetadata, RasterLayer};
use crate::preprocessing::operation::BandOperation;

pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    /// Tukey fences: `[Q1 - k * IQR, Q3 + k * IQR]`.
    #[default]
    Iqr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierClip {
    pub method: OutlierMethod,
    pub multiplier: f64,
}

impl Default for OutlierClip {
    fn default() -> Self {
        Self {
            method: OutlierMethod::Iqr,
            multiplier: DEFAULT_IQR_MULTIPLIER,
        }
    }
}

impl OutlierClip {
    pub fn new(method: OutlierMethod, multiplier: f64) -> Result<Self> {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(ProcessingError::config(format!(
                "outlier multiplier must be a finite value >= 0, got {multiplier}"
            )));
        }
        Ok(Self { method, multiplier })
    }

    /// Clip bounds for the valid values of a band, or `None` when it has none.
    ///
    /// Quartiles are nearest-rank order statistics, so they are themselves data
    /// values and clipping never moves them.
    pub fn bounds(&self, valid: &[f64]) -> Option<(f64, f64)> {
        match self.method {
            OutlierMethod::Iqr => {
                let mut sorted = valid.to_vec();
                sorted.sort_by(f64::total_cmp);
                let q1 = stats::nearest_rank_quantile(&sorted, 0.25)?;
                let q3 = stats::nearest_rank_quantile(&sorted, 0.75)?;
                let iqr = q3 - q1;
                Some((q1 - self.multiplier * iqr, q3 + self.multiplier * iqr))
            }
        }
    }
}

impl BandOperation for OutlierClip {
    fn name(&self) -> &'static str {
        "outlier"
    }

    fn apply(&self, band: &Array2<f64>, meta: &GridMetadata) -> Result<Array2<f64>> {
        let nodata = meta.nodata;
        let valid = stats::valid_values(band, nodata);
        let Some((lower, upper)) = self.bounds(&valid) else {
            debug!("Band has no valid cells, nothing to clip");
            return Ok(band.mapv(|x| if is_missing(x, nodata) { f64::NAN } else { x }));
        };
        debug!(lower, upper, "Clipping outliers");

        Ok(band.mapv(|x| {
            if is_missing(x, nodata) {
                f64::NAN
            } else {
                x.clamp(lower, upper)
            }
        }))
    }
}

/// Clips every band of `layer` independently and normalizes the result.
pub fn clip_outliers(layer: &RasterLayer, clip: OutlierClip) -> Result<RasterLayer> {
    layer.map_bands(&clip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::grid::GeoTransform;
    use ndarray::array;

    fn layer(band: Array2<f64>, nodata: Option<f64>) -> RasterLayer {
        let (rows, cols) = band.dim();
        let transform = GeoTransform::from_origin(0.0, 1.0, 1.0, 1.0);
        let meta = GridMetadata::new(transform, None, cols, rows).with_nodata(nodata);
        RasterLayer::single_band(band, meta).unwrap()
    }

    #[test]
    fn test_iqr_clips_high_outlier() {
        let input = layer(array![[1.0, 2.0, 3.0, 4.0, 100.0]], None);
        let out = clip_outliers(&input, OutlierClip::default()).unwrap();
        // Q1 = 2, Q3 = 4, upper fence = 4 + 1.5 * 2
        assert_eq!(out.bands()[0], array![[1.0, 2.0, 3.0, 4.0, 7.0]]);
    }

    #[test]
    fn test_nodata_cells_unaffected() {
        let out = clip_outliers(
            &layer(array![[1.0, 2.0, -1.0, 3.0, 4.0, 100.0]], Some(-1.0)),
            OutlierClip::default(),
        )
        .unwrap();
        let sentinel = out.meta().nodata.unwrap();
        assert_eq!(out.bands()[0][[0, 2]], sentinel);
        assert_eq!(out.bands()[0][[0, 5]], 7.0);
    }

    #[test]
    fn test_constant_band_collapses_to_q1() {
        let input = layer(array![[5.0, 5.0, 5.0]], None);
        let out = clip_outliers(&input, OutlierClip::default()).unwrap();
        assert_eq!(out.bands()[0], array![[5.0, 5.0, 5.0]]);
    }

    #[test]
    fn test_clipping_is_idempotent() {
        let inputs = [
            array![[0.3, -12.0, 5.5, 1.0, 2.0, 9e3, 4.4, -0.7]],
            array![[1.0, 1.0, 2.0, 50.0, 50.0, 51.0, -80.0]],
            array![[0.0, 0.1, 0.2, 0.3, 0.4, 0.5]],
        ];
        for multiplier in [0.0, 0.5, 1.5, 3.0] {
            let clip = OutlierClip::new(OutlierMethod::Iqr, multiplier).unwrap();
            for input in &inputs {
                let once = clip_outliers(&layer(input.clone(), None), clip).unwrap();
                let twice = clip_outliers(&once, clip).unwrap();
                assert_eq!(once.bands()[0], twice.bands()[0], "k = {multiplier}");
                assert_eq!(once.meta().dtype, twice.meta().dtype);
            }
        }
    }

    #[test]
    fn test_negative_multiplier_is_config_error() {
        assert!(matches!(
            OutlierClip::new(OutlierMethod::Iqr, -1.0),
            Err(ProcessingError::Config(_))
        ));
        assert!(OutlierClip::new(OutlierMethod::Iqr, f64::NAN).is_err());
    }
}
