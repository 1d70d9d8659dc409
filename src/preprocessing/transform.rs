//! Elementwise value transforms
//!
//! Each method touches valid cells only. Inputs outside a method's domain
//! (e.g. `log` of a non-positive value) become nodata.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::{self, is_missing};
use crate::preprocessing::grid::{GridMetadata, RasterLayer};
use crate::preprocessing::operation::BandOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMethod {
    /// `ln(x)`; `x <= 0` becomes nodata.
    Log,
    /// `ln(x + 1)`; `x <= -1` becomes nodata.
    Log1p,
    Abs,
    /// `sqrt(x)`; `x < 0` becomes nodata.
    Sqrt,
    /// `(x - min) / (max - min)`; a constant band maps to 0.
    MinMax,
    /// `x / max(|x|)`; an all-zero band maps to 0.
    MaxAbs,
    /// `(x - mean) / std`; a constant band maps to 0.
    #[serde(alias = "std")]
    Standard,
}

impl TransformMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            TransformMethod::Log => "log",
            TransformMethod::Log1p => "log1p",
            TransformMethod::Abs => "abs",
            TransformMethod::Sqrt => "sqrt",
            TransformMethod::MinMax => "minmax",
            TransformMethod::MaxAbs => "maxabs",
            TransformMethod::Standard => "standard",
        }
    }
}

impl fmt::Display for TransformMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformMethod {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(TransformMethod::Log),
            "log1p" => Ok(TransformMethod::Log1p),
            "abs" => Ok(TransformMethod::Abs),
            "sqrt" => Ok(TransformMethod::Sqrt),
            "minmax" => Ok(TransformMethod::MinMax),
            "maxabs" => Ok(TransformMethod::MaxAbs),
            "standard" | "std" => Ok(TransformMethod::Standard),
            other => Err(ProcessingError::config(format!("unknown transform method '{other}'"))),
        }
    }
}

impl BandOperation for TransformMethod {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn apply(&self, band: &Array2<f64>, meta: &GridMetadata) -> Result<Array2<f64>> {
        let nodata = meta.nodata;
        let valid = stats::valid_values(band, nodata);

        let map: Box<dyn Fn(f64) -> f64> = match self {
            TransformMethod::Log => Box::new(|x| if x > 0.0 { x.ln() } else { f64::NAN }),
            TransformMethod::Log1p => Box::new(|x| if x > -1.0 { x.ln_1p() } else { f64::NAN }),
            TransformMethod::Abs => Box::new(f64::abs),
            TransformMethod::Sqrt => Box::new(|x| if x >= 0.0 { x.sqrt() } else { f64::NAN }),
            TransformMethod::MinMax => match stats::min_max(&valid) {
                Some((min, max)) if max > min => Box::new(move |x| (x - min) / (max - min)),
                _ => Box::new(|_| 0.0),
            },
            TransformMethod::MaxAbs => {
                let scale = valid.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
                if scale > 0.0 {
                    Box::new(move |x| x / scale)
                } else {
                    Box::new(|_| 0.0)
                }
            }
            TransformMethod::Standard => match (stats::mean(&valid), stats::std_dev(&valid)) {
                (Some(mean), Some(std)) if std > 0.0 => Box::new(move |x| (x - mean) / std),
                _ => Box::new(|_| 0.0),
            },
        };

        Ok(band.mapv(|x| if is_missing(x, nodata) { f64::NAN } else { map(x) }))
    }
}

/// Applies `method` to every band of `layer` and normalizes the result.
pub fn transform(layer: &RasterLayer, method: TransformMethod) -> Result<RasterLayer> {
    layer.map_bands(&method)
}
