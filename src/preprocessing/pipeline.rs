//! Layer pipelines
//!
//! Step configuration and validation, the per-layer orchestrator, the
//! decode/run/encode wrapper around it, job files and the batch runner.

mod batch;
mod config;
mod job;
mod layer_pipeline;
mod orchestrator;
mod step;
mod timing;


pub use batch::{BatchReport, BatchRunner, LayerOutcome};
pub use config::{PipelineConfig, PipelineConfigBuilder, TemplateRegistry};
pub use job::{JobConfig, LayerJob};
pub use layer_pipeline::{InputFormat, LayerPipeline};
pub use orchestrator::{LayerInput, LayerReport, Orchestrator, RunState};
pub use step::{PipelineStep, ResolvedStep};
pub use timing::{PipelineTimings, StepTiming, Timer};
