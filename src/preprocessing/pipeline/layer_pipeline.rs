use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::preprocessing::common::error::{PipelineError, ProcessingError};
use crate::preprocessing::pipeline::config::{PipelineConfig, TemplateRegistry};
use crate::preprocessing::pipeline::orchestrator::{LayerInput, LayerReport, Orchestrator};
use crate::preprocessing::pipeline::timing::{PipelineTimings, Timer};
use crate::preprocessing::raster_io::{
    GeoTiffReader, GeoTiffWriter, RasterReader, RasterWriter, WriterConfig,
};
use crate::preprocessing::vector::{GeoJsonReader, VectorReader};

type Result<T> = std::result::Result<T, PipelineError>;

/// How the bytes of a layer's input are decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFormat {
    Raster,
    /// Feature collection; `layer` selects among several layers in one container.
    Vector { layer: Option<String> },
}

impl InputFormat {
    /// `.geojson` and `.json` files are vector sources, everything else raster.
    pub fn from_path(path: &Path, layer: Option<String>) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("geojson" | "json") => InputFormat::Vector { layer },
            _ => InputFormat::Raster,
        }
    }
}

/// Decode, run the configured steps, encode. Only a completed layer is written.
pub struct LayerPipeline<R: RasterReader, V: VectorReader, W: RasterWriter> {
    raster_reader: R,
    vector_reader: V,
    writer: W,
    config: WriterConfig,
}

impl LayerPipeline<GeoTiffReader, GeoJsonReader, GeoTiffWriter> {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            raster_reader: GeoTiffReader,
            vector_reader: GeoJsonReader::new(),
            writer: GeoTiffWriter,
            config,
        }
    }
}

impl<R: RasterReader, V: VectorReader, W: RasterWriter> LayerPipeline<R, V, W> {
    pub fn with_custom(
        raster_reader: R,
        vector_reader: V,
        writer: W,
        config: WriterConfig,
    ) -> Self {
        Self {
            raster_reader,
            vector_reader,
            writer,
            config,
        }
    }

    pub fn raster_reader(&self) -> &R {
        &self.raster_reader
    }

    pub fn vector_reader(&self) -> &V {
        &self.vector_reader
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WriterConfig) {
        self.config = config;
    }

    /// Decodes `input_data` into the layer the orchestrator starts from.
    pub fn decode(
        &self,
        layer_id: &str,
        format: &InputFormat,
        input_data: &[u8],
    ) -> Result<LayerInput> {
        let decoded = match format {
            InputFormat::Raster => {
                self.raster_reader.read_raster(input_data).map(LayerInput::Raster)
            }
            InputFormat::Vector { layer } => self
                .vector_reader
                .read_vector(input_data)
                .and_then(|container| container.into_selected(layer.as_deref()))
                .map(LayerInput::Vector),
        };
        decoded.map_err(|e| PipelineError::new(layer_id, None, e))
    }

    /// Decodes and validates without running any step.
    pub fn check(
        &self,
        pipeline: &PipelineConfig,
        format: &InputFormat,
        input_data: &[u8],
        templates: &TemplateRegistry,
    ) -> Result<()> {
        let input = self.decode(&pipeline.layer_id, format, input_data)?;
        Orchestrator::new(templates).check(pipeline, &input)
    }

    pub fn process(
        &self,
        pipeline: &PipelineConfig,
        format: &InputFormat,
        input_data: &[u8],
        templates: &TemplateRegistry,
        output: &mut dyn Write,
    ) -> Result<LayerReport> {
        let layer_id = pipeline.layer_id.as_str();
        let mut timings = PipelineTimings::new();

        let timer = Timer::start("decode");
        let input = self.decode(layer_id, format, input_data)?;
        timer.stop(&mut timings);

        let mut report = Orchestrator::new(templates).run(pipeline, input)?;
        timings.extend(std::mem::take(&mut report.timings));

        let timer = Timer::start("encode");
        self.writer
            .write_raster(&report.output, output, &self.config)
            .map_err(|e| PipelineError::new(layer_id, None, e))?;
        timer.stop(&mut timings);

        report.timings = timings;
        Ok(report)
    }

    /// Reads `input_path`, processes it, and writes `output_path` only when every step succeeded.
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        pipeline: &PipelineConfig,
        format: &InputFormat,
        input_path: P,
        output_path: Q,
        templates: &TemplateRegistry,
    ) -> Result<LayerReport> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();
        let layer_id = pipeline.layer_id.as_str();
        let io_err = |path: &Path, e: std::io::Error| {
            let source = std::io::Error::new(e.kind(), format!("{}: {e}", path.display()));
            PipelineError::new(layer_id, None, ProcessingError::Io(source))
        };

        info!(
            "Processing layer '{}': {} -> {}",
            layer_id,
            input_path.display(),
            output_path.display()
        );

        let timer = Timer::start("read_input_file");
        let input_data = std::fs::read(input_path).map_err(|e| io_err(input_path, e))?;
        let mut timings = PipelineTimings::new();
        timer.stop(&mut timings);

        let mut buffer: Vec<u8> = Vec::new();
        let mut report = self.process(pipeline, format, &input_data, templates, &mut buffer)?;

        let timer = Timer::start("write_output_file");
        std::fs::write(output_path, &buffer).map_err(|e| io_err(output_path, e))?;
        timings.extend(std::mem::take(&mut report.timings));
        timer.stop(&mut timings);

        report.timings = timings;
        Ok(report)
    }

    pub fn check_file<P: AsRef<Path>>(
        &self,
        pipeline: &PipelineConfig,
        format: &InputFormat,
        input_path: P,
        templates: &TemplateRegistry,
    ) -> Result<()> {
        let input_path = input_path.as_ref();
        let input_data = std::fs::read(input_path).map_err(|e| {
            let source = std::io::Error::new(e.kind(), format!("{}: {e}", input_path.display()));
            PipelineError::new(&pipeline.layer_id, None, ProcessingError::Io(source))
        })?;
        self.check(pipeline, format, &input_data, templates)
    }
}
