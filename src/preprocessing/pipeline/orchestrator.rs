//! Per-layer step sequencing.
//!
//! A run moves `Validating -> Running -> Completed | Failed`. Validation resolves the
//! whole configuration before anything executes; after that, steps run strictly in
//! order and the first failure ends the layer with no output.

use tracing::{debug, error, info, info_span};

use crate::preprocessing::clip::clip;
use crate::preprocessing::common::error::{PipelineError, ProcessingError, Result};
use crate::preprocessing::coregister::coregister;
use crate::preprocessing::dilate::dilate;
use crate::preprocessing::grid::RasterLayer;
use crate::preprocessing::impute::impute;
use crate::preprocessing::normalize::{normalize, NormalizeOptions};
use crate::preprocessing::outlier::clip_outliers;
use crate::preprocessing::pipeline::config::{PipelineConfig, TemplateRegistry};
use crate::preprocessing::pipeline::step::ResolvedStep;
use crate::preprocessing::pipeline::timing::{PipelineTimings, Timer};
use crate::preprocessing::proximity::proximity;
use crate::preprocessing::transform::transform;
use crate::preprocessing::vector::{prepare_vector_layer, Rasterizer, VectorLayer};

/// The layer a pipeline starts from.
#[derive(Debug, Clone)]
pub enum LayerInput {
    Raster(RasterLayer),
    Vector(VectorLayer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    Running { step: usize },
    Completed,
    Failed,
}

/// Output of a completed layer.
#[derive(Debug)]
pub struct LayerReport {
    pub layer_id: String,
    pub output: RasterLayer,
    pub timings: PipelineTimings,
}

pub struct Orchestrator<'t> {
    templates: &'t TemplateRegistry,
    state: RunState,
}

impl<'t> Orchestrator<'t> {
    pub fn new(templates: &'t TemplateRegistry) -> Self {
        Self {
            templates,
            state: RunState::Validating,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Validates `config` against `input` without running anything.
    pub fn check(
        &self,
        config: &PipelineConfig,
        input: &LayerInput,
    ) -> std::result::Result<(), PipelineError> {
        config
            .validate(input, self.templates)
            .map(|_| ())
            .map_err(|e| PipelineError::new(&config.layer_id, None, e))
    }

    pub fn run(
        &mut self,
        config: &PipelineConfig,
        input: LayerInput,
    ) -> std::result::Result<LayerReport, PipelineError> {
        let layer_id = config.layer_id.as_str();
        self.state = RunState::Validating;
        info!(layer = layer_id, steps = config.steps.len(), "Starting layer pipeline");

        let plan = match config.validate(&input, self.templates) {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(layer_id, None, e)),
        };

        let mut timings = PipelineTimings::new();
        let mut current = input;
        for (index, step) in plan.iter().enumerate() {
            self.state = RunState::Running { step: index };
            let span = info_span!("step", index, step = step.name());
            let _guard = span.enter();

            let timer = Timer::start_step(index, step.name());
            current = match execute(step, current) {
                Ok(layer) => LayerInput::Raster(layer),
                Err(e) => return Err(self.fail(layer_id, Some(index), e)),
            };
            timer.stop(&mut timings);
            debug!("Step complete");
        }

        let output = match current {
            LayerInput::Raster(layer) => normalize(layer, NormalizeOptions::default()),
            LayerInput::Vector(_) => {
                let e = ProcessingError::config("vector input was never rasterized");
                return Err(self.fail(layer_id, None, e));
            }
        };

        self.state = RunState::Completed;
        info!(
            layer = layer_id,
            bands = output.band_count(),
            dtype = %output.meta().dtype,
            "Layer completed in {:.3}ms",
            timings.total_duration().as_secs_f64() * 1000.0
        );
        Ok(LayerReport {
            layer_id: layer_id.to_string(),
            output,
            timings,
        })
    }

    fn fail(
        &mut self,
        layer_id: &str,
        step_index: Option<usize>,
        source: ProcessingError,
    ) -> PipelineError {
        self.state = RunState::Failed;
        let e = PipelineError::new(layer_id, step_index, source);
        error!("{e}");
        e
    }
}

fn execute(step: &ResolvedStep<'_>, input: LayerInput) -> Result<RasterLayer> {
    let raster = |input: LayerInput| match input {
        LayerInput::Raster(layer) => Ok(layer),
        LayerInput::Vector(_) => Err(ProcessingError::config("step requires a raster input")),
    };

    match step {
        ResolvedStep::Transform(method) => transform(&raster(input)?, *method),
        ResolvedStep::Impute { imputation, mask } => impute(&raster(input)?, *imputation, *mask),
        ResolvedStep::Outlier(clip) => clip_outliers(&raster(input)?, *clip),
        ResolvedStep::Proximity(params) => proximity(&raster(input)?, *params),
        ResolvedStep::Dilate(params) => dilate(&raster(input)?, *params),
        ResolvedStep::Clip { aoi, crop } => clip(&raster(input)?, aoi, *crop),
        ResolvedStep::Coregister { template, resampling } => {
            coregister(&raster(input)?, template.meta(), *resampling)
        }
        ResolvedStep::Rasterize {
            mode,
            column,
            query,
            overlap,
            template,
        } => {
            let LayerInput::Vector(layer) = input else {
                return Err(ProcessingError::config("rasterize requires a vector input"));
            };
            let prepared = prepare_vector_layer(&layer, template.meta(), query.as_ref())?;
            Rasterizer::new(template)
                .with_policy(*overlap)
                .rasterize(&prepared, *mode, column.as_deref())
        }
    }
}
