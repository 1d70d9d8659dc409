use serde::{Deserialize, Serialize};

use crate::preprocessing::coregister::ResamplingMethod;
use crate::preprocessing::dilate::{Dilation, DEFAULT_MAX_DISTANCE};
use crate::preprocessing::impute::{ImputeMethod, Imputation};
use crate::preprocessing::outlier::{OutlierClip, OutlierMethod, DEFAULT_IQR_MULTIPLIER};
use crate::preprocessing::proximity::{Proximity, DEFAULT_TARGET_VALUE};
use crate::preprocessing::grid::RasterLayer;
use crate::preprocessing::transform::TransformMethod;
use crate::preprocessing::vector::{FeatureQuery, OverlapPolicy, RasterizeMode, VectorLayer};

fn default_multiplier() -> f64 {
    DEFAULT_IQR_MULTIPLIER
}

fn default_target_value() -> f64 {
    DEFAULT_TARGET_VALUE
}

fn default_max_distance() -> f64 {
    DEFAULT_MAX_DISTANCE
}

fn default_crop() -> bool {
    true
}

/// One configured preprocessing step, as written in a job file.
///
/// Serialized with a `step` tag, e.g. `{ step = "outlier", multiplier = 3.0 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum PipelineStep {
    Transform {
        method: TransformMethod,
    },
    Impute {
        method: ImputeMethod,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        custom_value: Option<f64>,
        /// Template id whose nodata footprint is re-applied after filling.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mask_template: Option<String>,
    },
    Outlier {
        #[serde(default)]
        method: OutlierMethod,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
    Rasterize {
        mode: RasterizeMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
        /// Attribute filter applied before burning, e.g. `type == 'fault'`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default)]
        overlap: OverlapPolicy,
    },
    Coregister {
        /// Template id; falls back to the layer's template.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        /// Nearest for integer layers and bilinear for float layers when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resampling: Option<ResamplingMethod>,
    },
    Proximity {
        #[serde(default = "default_target_value")]
        target_value: f64,
    },
    /// Fills nodata cells from valid cells up to `max_distance` cells away.
    Dilate {
        #[serde(default = "default_max_distance")]
        max_distance: f64,
        #[serde(default)]
        smoothing_iterations: u32,
        #[serde(default)]
        label: bool,
    },
    /// Masks cells outside an area of interest; `crop` also shrinks the grid.
    Clip {
        aoi: String,
        #[serde(default = "default_crop")]
        crop: bool,
    },
}

impl PipelineStep {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::Transform { .. } => "transform",
            PipelineStep::Impute { .. } => "impute",
            PipelineStep::Outlier { .. } => "outlier",
            PipelineStep::Rasterize { .. } => "rasterize",
            PipelineStep::Coregister { .. } => "coregister",
            PipelineStep::Proximity { .. } => "proximity",
            PipelineStep::Dilate { .. } => "dilate",
            PipelineStep::Clip { .. } => "clip",
        }
    }
}

/// A step with every parameter checked and every template reference resolved.
#[derive(Debug, Clone)]
pub enum ResolvedStep<'t> {
    Transform(TransformMethod),
    Impute {
        imputation: Imputation,
        mask: Option<&'t RasterLayer>,
    },
    Outlier(OutlierClip),
    Rasterize {
        mode: RasterizeMode,
        column: Option<String>,
        query: Option<FeatureQuery>,
        overlap: OverlapPolicy,
        template: &'t RasterLayer,
    },
    Coregister {
        template: &'t RasterLayer,
        resampling: Option<ResamplingMethod>,
    },
    Proximity(Proximity),
    Dilate(Dilation),
    Clip {
        aoi: &'t VectorLayer,
        crop: bool,
    },
}

impl ResolvedStep<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            ResolvedStep::Transform(_) => "transform",
            ResolvedStep::Impute { .. } => "impute",
            ResolvedStep::Outlier(_) => "outlier",
            ResolvedStep::Rasterize { .. } => "rasterize",
            ResolvedStep::Coregister { .. } => "coregister",
            ResolvedStep::Proximity(_) => "proximity",
            ResolvedStep::Dilate(_) => "dilate",
            ResolvedStep::Clip { .. } => "clip",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_from_toml() {
        #[derive(Deserialize)]
        struct Steps {
            steps: Vec<PipelineStep>,
        }

        let parsed: Steps = toml::from_str(
            r#"
            steps = [
                { step = "transform", method = "std" },
                { step = "impute", method = "custom", custom_value = -1.0 },
                { step = "outlier" },
                { step = "coregister", resampling = "bicubic" },
                { step = "proximity" },
                { step = "dilate", max_distance = 10.0, label = true },
                { step = "clip", aoi = "basin" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(
            parsed.steps,
            vec![
                PipelineStep::Transform {
                    method: TransformMethod::Standard
                },
                PipelineStep::Impute {
                    method: ImputeMethod::Custom,
                    custom_value: Some(-1.0),
                    mask_template: None
                },
                PipelineStep::Outlier {
                    method: OutlierMethod::Iqr,
                    multiplier: 1.5
                },
                PipelineStep::Coregister {
                    template: None,
                    resampling: Some(ResamplingMethod::Cubic)
                },
                PipelineStep::Proximity { target_value: 1.0 },
                PipelineStep::Dilate {
                    max_distance: 10.0,
                    smoothing_iterations: 0,
                    label: true
                },
                PipelineStep::Clip {
                    aoi: "basin".to_string(),
                    crop: true
                },
            ]
        );
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let cube = r#"{"step": "transform", "method": "cube"}"#;
        let result = serde_json::from_str::<PipelineStep>(cube);
        assert!(result.is_err());
        let result = serde_json::from_str::<PipelineStep>(r#"{"step": "smooth"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rasterize_json() {
        let json = r#"{"step": "rasterize", "mode": "categorical", "column": "kind",
            "overlap": "last_wins"}"#;
        let step: PipelineStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.name(), "rasterize");
        assert!(matches!(
            step,
            PipelineStep::Rasterize {
                mode: RasterizeMode::Categorical,
                overlap: OverlapPolicy::LastWins,
                ..
            }
        ));
    }
}
