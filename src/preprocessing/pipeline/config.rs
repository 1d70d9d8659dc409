use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::dilate::Dilation;
use crate::preprocessing::grid::RasterLayer;
use crate::preprocessing::impute::Imputation;
use crate::preprocessing::outlier::OutlierClip;
use crate::preprocessing::pipeline::orchestrator::LayerInput;
use crate::preprocessing::pipeline::step::{PipelineStep, ResolvedStep};
use crate::preprocessing::proximity::Proximity;
use crate::preprocessing::vector::{FeatureQuery, VectorLayer};

/// Template rasters and area-of-interest layers available to a run, by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, RasterLayer>,
    aois: BTreeMap<String, VectorLayer>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, template: RasterLayer) {
        self.templates.insert(id.into(), template);
    }

    pub fn with_template(mut self, id: impl Into<String>, template: RasterLayer) -> Self {
        self.insert(id, template);
        self
    }

    pub fn get(&self, id: &str) -> Result<&RasterLayer> {
        self.templates.get(id).ok_or_else(|| {
            ProcessingError::config(format!(
                "unknown template '{id}' (available: {:?})",
                self.templates.keys().collect::<Vec<_>>()
            ))
        })
    }

    pub fn insert_aoi(&mut self, id: impl Into<String>, aoi: VectorLayer) {
        self.aois.insert(id.into(), aoi);
    }

    pub fn with_aoi(mut self, id: impl Into<String>, aoi: VectorLayer) -> Self {
        self.insert_aoi(id, aoi);
        self
    }

    pub fn aoi(&self, id: &str) -> Result<&VectorLayer> {
        self.aois.get(id).ok_or_else(|| {
            ProcessingError::config(format!(
                "unknown area of interest '{id}' (available: {:?})",
                self.aois.keys().collect::<Vec<_>>()
            ))
        })
    }

    pub fn aoi_count(&self) -> usize {
        self.aois.len()
    }

    /// Number of template rasters.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// The ordered steps for one layer plus the template it is aligned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub layer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
}

impl PipelineConfig {
    pub fn builder(layer_id: impl Into<String>) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            layer_id: layer_id.into(),
            template: None,
            steps: Vec::new(),
        }
    }

    /// Checks every step against the input kind and resolves template references.
    ///
    /// Vector input must start with a rasterize step and nothing else may rasterize.
    /// All failures are `ConfigError`s, raised before any step executes.
    pub fn validate<'t>(
        &self,
        input: &LayerInput,
        templates: &'t TemplateRegistry,
    ) -> Result<Vec<ResolvedStep<'t>>> {
        let vector_input = matches!(input, LayerInput::Vector(_));
        match (vector_input, self.steps.first()) {
            (true, Some(PipelineStep::Rasterize { .. })) => {}
            (true, _) => {
                return Err(ProcessingError::config(
                    "vector input must start with a rasterize step",
                ));
            }
            (false, _) => {}
        }

        let layer_template = || {
            let id = self.template.as_deref().ok_or_else(|| {
                ProcessingError::config(format!("layer '{}' has no template", self.layer_id))
            })?;
            templates.get(id)
        };

        let mut plan = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let resolved = match step {
                PipelineStep::Transform { method } => ResolvedStep::Transform(*method),
                PipelineStep::Impute {
                    method,
                    custom_value,
                    mask_template,
                } => ResolvedStep::Impute {
                    imputation: Imputation::resolve(*method, *custom_value)?,
                    mask: mask_template.as_deref().map(|id| templates.get(id)).transpose()?,
                },
                PipelineStep::Outlier { method, multiplier } => {
                    ResolvedStep::Outlier(OutlierClip::new(*method, *multiplier)?)
                }
                PipelineStep::Rasterize {
                    mode,
                    column,
                    query,
                    overlap,
                } => {
                    let LayerInput::Vector(layer) = input else {
                        return Err(ProcessingError::config("rasterize requires a vector input"));
                    };
                    if index > 0 {
                        return Err(ProcessingError::config(format!(
                            "rasterize must be the first step, found at step {index}"
                        )));
                    }
                    match column {
                        Some(column) if !layer.has_column(column) => {
                            return Err(ProcessingError::config(format!(
                                "layer '{}' has no column '{column}'",
                                layer.name
                            )));
                        }
                        None if mode.needs_column() => {
                            return Err(ProcessingError::config(format!(
                                "{mode:?} rasterization requires a column"
                            )));
                        }
                        _ => {}
                    }
                    let query = query.as_deref().map(str::parse::<FeatureQuery>).transpose()?;
                    if let Some(missing) = query
                        .as_ref()
                        .and_then(|query| query.columns().find(|column| !layer.has_column(column)))
                    {
                        return Err(ProcessingError::config(format!(
                            "query references unknown column '{missing}'"
                        )));
                    }
                    ResolvedStep::Rasterize {
                        mode: *mode,
                        column: column.clone(),
                        query,
                        overlap: *overlap,
                        template: layer_template()?,
                    }
                }
                PipelineStep::Coregister { template, resampling } => ResolvedStep::Coregister {
                    template: match template {
                        Some(id) => templates.get(id)?,
                        None => layer_template()?,
                    },
                    resampling: *resampling,
                },
                PipelineStep::Proximity { target_value } => {
                    if !target_value.is_finite() {
                        return Err(ProcessingError::config(format!(
                            "proximity target must be finite, got {target_value}"
                        )));
                    }
                    ResolvedStep::Proximity(Proximity::new(*target_value))
                }
                PipelineStep::Dilate {
                    max_distance,
                    smoothing_iterations,
                    label,
                } => ResolvedStep::Dilate(Dilation::new(
                    *max_distance,
                    *smoothing_iterations,
                    *label,
                )?),
                PipelineStep::Clip { aoi, crop } => ResolvedStep::Clip {
                    aoi: templates.aoi(aoi)?,
                    crop: *crop,
                },
            };
            plan.push(resolved);
        }

        debug!(layer = %self.layer_id, steps = plan.len(), "Validated pipeline configuration");
        Ok(plan)
    }
}

/// Builder for PipelineConfig
pub struct PipelineConfigBuilder {
    layer_id: String,
    template: Option<String>,
    steps: Vec<PipelineStep>,
}

impl PipelineConfigBuilder {
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = PipelineStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            layer_id: self.layer_id,
            template: self.template,
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::grid::{Crs, GeoTransform, GridMetadata};
    use crate::preprocessing::impute::ImputeMethod;
    use crate::preprocessing::outlier::OutlierMethod;
    use crate::preprocessing::transform::TransformMethod;
    use crate::preprocessing::vector::{Feature, OverlapPolicy, RasterizeMode, VectorLayer};
    use geo::{point, Geometry};
    use ndarray::Array2;

    fn is_config_error<T>(result: Result<T>) -> bool {
        matches!(result, Err(ProcessingError::Config(_)))
    }

    fn templates() -> TemplateRegistry {
        let transform = GeoTransform::from_origin(0.0, 4.0, 1.0, 1.0);
        let meta = GridMetadata::new(transform, Some(Crs::Epsg(3857)), 4, 4);
        let template = RasterLayer::single_band(Array2::zeros((4, 4)), meta).unwrap();
        TemplateRegistry::new().with_template("dem", template)
    }

    fn vector_input() -> LayerInput {
        let feature =
            Feature::new(Geometry::Point(point!(x: 1.5, y: 1.5))).with_attribute("kind", "fault");
        LayerInput::Vector(VectorLayer::new("faults", Some(Crs::Epsg(3857)), vec![feature]))
    }

    fn raster_input() -> LayerInput {
        let transform = GeoTransform::from_origin(0.0, 2.0, 1.0, 1.0);
        let meta = GridMetadata::new(transform, Some(Crs::Epsg(3857)), 2, 2);
        LayerInput::Raster(RasterLayer::single_band(Array2::ones((2, 2)), meta).unwrap())
    }

    fn rasterize(column: Option<&str>, mode: RasterizeMode) -> PipelineStep {
        PipelineStep::Rasterize {
            mode,
            column: column.map(str::to_string),
            query: None,
            overlap: OverlapPolicy::Max,
        }
    }

    #[test]
    fn test_valid_plan_resolves_templates() {
        let registry = templates();
        let config = PipelineConfig::builder("faults")
            .template("dem")
            .step(rasterize(Some("kind"), RasterizeMode::Categorical))
            .step(PipelineStep::Proximity { target_value: 1.0 })
            .build();
        let plan = config.validate(&vector_input(), &registry).unwrap();
        let names: Vec<_> = plan.iter().map(ResolvedStep::name).collect();
        assert_eq!(names, vec!["rasterize", "proximity"]);
    }

    #[test]
    fn test_vector_input_requires_rasterize_first() {
        let registry = templates();
        let config = PipelineConfig::builder("faults")
            .template("dem")
            .step(PipelineStep::Transform {
                method: TransformMethod::Log,
            })
            .build();
        assert!(is_config_error(config.validate(&vector_input(), &registry)));
    }

    #[test]
    fn test_rasterize_rejects_raster_input() {
        let registry = templates();
        let config = PipelineConfig::builder("dem")
            .template("dem")
            .step(rasterize(None, RasterizeMode::Binary))
            .build();
        assert!(is_config_error(config.validate(&raster_input(), &registry)));
    }

    #[test]
    fn test_missing_parameters_fail_validation() {
        let registry = templates();
        let cases = vec![
            // continuous without a column
            rasterize(None, RasterizeMode::Continuous),
            // column the layer does not have
            rasterize(Some("depth"), RasterizeMode::Categorical),
        ];
        for step in cases {
            let config = PipelineConfig::builder("faults").template("dem").step(step).build();
            assert!(is_config_error(config.validate(&vector_input(), &registry)));
        }

        let raster_cases = vec![
            PipelineStep::Impute {
                method: ImputeMethod::Custom,
                custom_value: None,
                mask_template: None,
            },
            PipelineStep::Outlier {
                method: OutlierMethod::Iqr,
                multiplier: -1.0,
            },
            PipelineStep::Coregister {
                template: Some("missing".to_string()),
                resampling: None,
            },
        ];
        for step in raster_cases {
            let config = PipelineConfig::builder("dem").template("dem").step(step).build();
            assert!(is_config_error(config.validate(&raster_input(), &registry)));
        }
    }

    #[test]
    fn test_coregister_needs_a_template() {
        let registry = templates();
        let config = PipelineConfig::builder("dem")
            .step(PipelineStep::Coregister {
                template: None,
                resampling: None,
            })
            .build();
        assert!(is_config_error(config.validate(&raster_input(), &registry)));
    }

    #[test]
    fn test_dilate_and_clip_resolve() {
        let aoi = VectorLayer::new(
            "basin",
            Some(Crs::Epsg(3857)),
            vec![Feature::new(Geometry::Point(point!(x: 0.5, y: 0.5)))],
        );
        let registry = templates().with_aoi("basin", aoi);
        let config = PipelineConfig::builder("dem")
            .step(PipelineStep::Dilate {
                max_distance: 3.0,
                smoothing_iterations: 1,
                label: false,
            })
            .step(PipelineStep::Clip {
                aoi: "basin".to_string(),
                crop: true,
            })
            .build();
        let plan = config.validate(&raster_input(), &registry).unwrap();
        assert!(matches!(plan[0], ResolvedStep::Dilate(Dilation { max_distance: 3.0, .. })));
        assert!(matches!(plan[1], ResolvedStep::Clip { crop: true, .. }));

        let unknown = PipelineConfig::builder("dem")
            .step(PipelineStep::Clip {
                aoi: "coast".to_string(),
                crop: false,
            })
            .build();
        assert!(is_config_error(unknown.validate(&raster_input(), &registry)));

        let negative = PipelineConfig::builder("dem")
            .step(PipelineStep::Dilate {
                max_distance: -1.0,
                smoothing_iterations: 0,
                label: false,
            })
            .build();
        assert!(is_config_error(negative.validate(&raster_input(), &registry)));
    }

    #[test]
    fn test_malformed_query_is_config_error() {
        let registry = templates();
        let config = PipelineConfig::builder("faults")
            .template("dem")
            .step(PipelineStep::Rasterize {
                mode: RasterizeMode::Binary,
                column: None,
                query: Some("kind ==".to_string()),
                overlap: OverlapPolicy::Max,
            })
            .build();
        assert!(is_config_error(config.validate(&vector_input(), &registry)));
    }
}
