//! Missing-value imputation
//!
//! Fills nodata cells with a per-band statistic or a constant, optionally
//! re-masking cells that fall outside a template's valid footprint.

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::{self, is_missing};
use crate::preprocessing::grid::{GridMetadata, RasterLayer};
use crate::preprocessing::operation::BandOperation;

/// Imputation method names as they appear in a pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeMethod {
    Min,
    Max,
    Mean,
    Median,
    Zero,
    Custom,
}

impl fmt::Display for ImputeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImputeMethod::Min => "min",
            ImputeMethod::Max => "max",
            ImputeMethod::Mean => "mean",
            ImputeMethod::Median => "median",
            ImputeMethod::Zero => "zero",
            ImputeMethod::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A fully resolved imputation, with the custom value attached where needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Imputation {
    Min,
    Max,
    Mean,
    Median,
    Zero,
    Custom(f64),
}

impl Imputation {
    pub fn resolve(method: ImputeMethod, custom_value: Option<f64>) -> Result<Self> {
        match (method, custom_value) {
            (ImputeMethod::Custom, Some(value)) if value.is_finite() => {
                Ok(Imputation::Custom(value))
            }
            (ImputeMethod::Custom, Some(value)) => Err(ProcessingError::config(format!(
                "custom imputation value must be finite, got {value}"
            ))),
            (ImputeMethod::Custom, None) => Err(ProcessingError::config(
                "custom imputation requires a custom_value",
            )),
            (ImputeMethod::Min, _) => Ok(Imputation::Min),
            (ImputeMethod::Max, _) => Ok(Imputation::Max),
            (ImputeMethod::Mean, _) => Ok(Imputation::Mean),
            (ImputeMethod::Median, _) => Ok(Imputation::Median),
            (ImputeMethod::Zero, _) => Ok(Imputation::Zero),
        }
    }

    fn fill_value(&self, valid: &[f64]) -> Option<f64> {
        match self {
            Imputation::Min => stats::min_max(valid).map(|(min, _)| min),
            Imputation::Max => stats::min_max(valid).map(|(_, max)| max),
            Imputation::Mean => stats::mean(valid),
            Imputation::Median => stats::median(valid),
            Imputation::Zero => Some(0.0),
            Imputation::Custom(value) => Some(*value),
        }
    }
}

/// Imputation bound to an optional footprint mask.
pub struct Imputer<'a> {
    imputation: Imputation,
    mask: Option<&'a RasterLayer>,
}

impl<'a> Imputer<'a> {
    pub fn new(imputation: Imputation) -> Self {
        Self {
            imputation,
            mask: None,
        }
    }

    /// Cells where `template`'s first band is nodata are forced back to nodata.
    pub fn with_mask(mut self, template: &'a RasterLayer) -> Self {
        self.mask = Some(template);
        self
    }
}

impl BandOperation for Imputer<'_> {
    fn name(&self) -> &'static str {
        "impute"
    }

    fn apply(&self, band: &Array2<f64>, meta: &GridMetadata) -> Result<Array2<f64>> {
        let nodata = meta.nodata;
        let valid = stats::valid_values(band, nodata);
        let fill = self.imputation.fill_value(&valid).ok_or_else(|| {
            ProcessingError::data(format!(
                "cannot impute with {:?}: band has no valid cells",
                self.imputation
            ))
        })?;
        debug!(fill, valid = valid.len(), "Imputing missing cells");

        let mut out = band.mapv(|x| if is_missing(x, nodata) { fill } else { x });

        if let Some(template) = self.mask {
            if template.meta().shape() != meta.shape() {
                return Err(ProcessingError::data(format!(
                    "mask template shape {:?} does not match layer shape {:?}",
                    template.meta().shape(),
                    meta.shape()
                )));
            }
            let footprint = template.valid_mask();
            ndarray::Zip::from(&mut out)
                .and(&footprint)
                .for_each(|cell, &inside| {
                    if !inside {
                        *cell = f64::NAN;
                    }
                });
        }

        Ok(out)
    }

    fn retires_nodata(&self) -> bool {
        true
    }
}

/// Imputes every band of `layer` independently and normalizes the result.
pub fn impute(
    layer: &RasterLayer,
    imputation: Imputation,
    mask: Option<&RasterLayer>,
) -> Result<RasterLayer> {
    let imputer = match mask {
        Some(template) => Imputer::new(imputation).with_mask(template),
        None => Imputer::new(imputation),
    };
    layer.map_bands(&imputer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::grid::{ElementType, GeoTransform};
    use ndarray::array;

    fn layer(band: Array2<f64>, nodata: Option<f64>) -> RasterLayer {
        let (rows, cols) = band.dim();
        let transform = GeoTransform::from_origin(0.0, 1.0, 1.0, 1.0);
        let meta = GridMetadata::new(transform, None, cols, rows).with_nodata(nodata);
        RasterLayer::single_band(band, meta).unwrap()
    }

    #[test]
    fn test_mean_imputation_retires_sentinel() {
        let input = layer(array![[1.0, 2.0, f64::NAN, 4.0]], Some(f64::NAN));
        let out = impute(&input, Imputation::Mean, None).unwrap();
        let band = &out.bands()[0];
        assert_eq!(out.meta().nodata, None);
        assert_eq!(out.meta().dtype, ElementType::Float32);
        assert_eq!(band[[0, 0]], 1.0);
        assert_eq!(band[[0, 1]], 2.0);
        assert!((band[[0, 2]] - 7.0 / 3.0).abs() < 1e-6);
        assert_eq!(band[[0, 3]], 4.0);
    }

    #[test]
    fn test_every_method_fills_all_cells() {
        let input = layer(array![[3.0, -9999.0], [1.0, 8.0]], Some(-9999.0));
        let expected = [
            (Imputation::Min, 1.0),
            (Imputation::Max, 8.0),
            (Imputation::Median, 3.0),
            (Imputation::Zero, 0.0),
            (Imputation::Custom(42.0), 42.0),
        ];
        for (imputation, fill) in expected {
            let out = impute(&input, imputation, None).unwrap();
            assert_eq!(out.missing_count(), 0, "{imputation:?}");
            assert_eq!(out.bands()[0][[0, 1]], fill, "{imputation:?}");
        }
    }

    #[test]
    fn test_statistic_on_all_nodata_is_data_error() {
        let input = layer(array![[-1.0, -1.0]], Some(-1.0));
        for imputation in [Imputation::Min, Imputation::Max, Imputation::Mean, Imputation::Median] {
            assert!(matches!(impute(&input, imputation, None), Err(ProcessingError::Data(_))));
        }
        let out = impute(&input, Imputation::Zero, None).unwrap();
        assert_eq!(out.bands()[0], array![[0.0, 0.0]]);
        let out = impute(&input, Imputation::Custom(7.0), None).unwrap();
        assert_eq!(out.bands()[0], array![[7.0, 7.0]]);
    }

    #[test]
    fn test_mask_template_reexcludes_cells() {
        let input = layer(array![[f64::NAN, 2.0, f64::NAN]], Some(f64::NAN));
        let template = layer(array![[1.0, 1.0, 0.0]], Some(0.0));
        let out = impute(&input, Imputation::Zero, Some(&template)).unwrap();
        let sentinel = out.meta().nodata.expect("masked cells keep a sentinel");
        assert_eq!(out.bands()[0], array![[0.0, 2.0, sentinel]]);
        assert_eq!(out.missing_count(), 1);
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let input = layer(array![[f64::NAN, 2.0]], Some(f64::NAN));
        let template = layer(array![[1.0, 1.0, 1.0]], None);
        assert!(matches!(
            impute(&input, Imputation::Zero, Some(&template)),
            Err(ProcessingError::Data(_))
        ));
    }

    #[test]
    fn test_custom_requires_value() {
        assert!(matches!(
            Imputation::resolve(ImputeMethod::Custom, None),
            Err(ProcessingError::Config(_))
        ));
        assert_eq!(
            Imputation::resolve(ImputeMethod::Custom, Some(1.5)).unwrap(),
            Imputation::Custom(1.5)
        );
        assert_eq!(Imputation::resolve(ImputeMethod::Median, None).unwrap(), Imputation::Median);
    }
}
