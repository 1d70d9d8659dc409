use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

use crate::preprocessing::common::error::{PipelineError, ProcessingError, Result};
use crate::preprocessing::pipeline::config::TemplateRegistry;
use crate::preprocessing::pipeline::job::JobConfig;
use crate::preprocessing::pipeline::layer_pipeline::LayerPipeline;
use crate::preprocessing::pipeline::orchestrator::LayerReport;
use crate::preprocessing::raster_io::{RasterReader, RasterWriter};
use crate::preprocessing::vector::VectorReader;

/// Result of one layer in a batch.
#[derive(Debug)]
pub struct LayerOutcome {
    pub layer_id: String,
    pub result: std::result::Result<LayerReport, PipelineError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<LayerOutcome>,
}

impl BatchReport {
    pub fn completed(&self) -> impl Iterator<Item = &LayerReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PipelineError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

/// Runs the layers of a job in a bounded pool, one layer per worker at a time.
///
/// Layers share nothing but the read-only templates, so a failure stays with its layer.
pub struct BatchRunner<R: RasterReader, V: VectorReader, W: RasterWriter> {
    pipeline: LayerPipeline<R, V, W>,
    workers: usize,
}

impl<R, V, W> BatchRunner<R, V, W>
where
    R: RasterReader + Sync,
    V: VectorReader + Sync,
    W: RasterWriter + Sync,
{
    pub fn new(pipeline: LayerPipeline<R, V, W>, workers: usize) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn pool(&self) -> Result<rayon::ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("rasterprep-worker-{i}"))
            .build()
            .map_err(|e| ProcessingError::config(format!("cannot start worker pool: {e}")))
    }

    pub fn run(&self, job: &JobConfig, templates: &TemplateRegistry) -> Result<BatchReport> {
        info!(layers = job.layers.len(), workers = self.workers, "Starting batch");
        let outcomes: Vec<LayerOutcome> = self.pool()?.install(|| {
            job.layers
                .par_iter()
                .map(|layer| LayerOutcome {
                    layer_id: layer.id.clone(),
                    result: self.pipeline.process_file(
                        &layer.pipeline_config(),
                        &layer.input_format(),
                        &layer.input,
                        &layer.output,
                        templates,
                    ),
                })
                .collect()
        });

        let report = BatchReport { outcomes };
        let failed = report.failed().count();
        if failed > 0 {
            warn!(failed, total = report.outcomes.len(), "Batch finished with failed layers");
        } else {
            info!(total = report.outcomes.len(), "Batch finished");
        }
        Ok(report)
    }

    /// Decodes every input and validates its steps; nothing is executed or written.
    pub fn check(
        &self,
        job: &JobConfig,
        templates: &TemplateRegistry,
    ) -> Result<Vec<(String, std::result::Result<(), PipelineError>)>> {
        let checks = self.pool()?.install(|| {
            job.layers
                .par_iter()
                .map(|layer| {
                    let result = self.pipeline.check_file(
                        &layer.pipeline_config(),
                        &layer.input_format(),
                        &layer.input,
                        templates,
                    );
                    (layer.id.clone(), result)
                })
                .collect()
        });
        Ok(checks)
    }
}
