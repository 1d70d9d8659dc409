//! Job files: templates, areas of interest, layers and writer options for a batch run.
//!
//! ```toml
//! workers = 4
//!
//! [templates]
//! dem = "rasters/dem.tif"
//!
//! [aois]
//! basin = "vectors/basin.geojson"
//!
//! [writer]
//! compression = "deflate_balanced"
//!
//! [[layers]]
//! id = "faults"
//! input = "vectors/faults.geojson"
//! template = "dem"
//! output = "out/faults.tif"
//! steps = [
//!     { step = "rasterize", mode = "binary" },
//!     { step = "proximity" },
//!     { step = "clip", aoi = "basin" },
//! ]
//! ```
//!
//! Relative paths are resolved against the job file's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::pipeline::config::{PipelineConfig, TemplateRegistry};
use crate::preprocessing::pipeline::layer_pipeline::InputFormat;
use crate::preprocessing::pipeline::step::PipelineStep;
use crate::preprocessing::raster_io::{RasterReader, WriterConfig};
use crate::preprocessing::vector::VectorReader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Template id to raster path.
    #[serde(default)]
    pub templates: BTreeMap<String, PathBuf>,
    /// Area-of-interest id to vector path, for `clip` steps.
    #[serde(default)]
    pub aois: BTreeMap<String, PathBuf>,
    pub layers: Vec<LayerJob>,
    /// Worker threads for the batch; defaults to the number of CPUs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default)]
    pub writer: WriterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerJob {
    pub id: String,
    pub input: PathBuf,
    /// Layer name inside a multi-layer vector container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
    pub output: PathBuf,
}

impl LayerJob {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            layer_id: self.id.clone(),
            template: self.template.clone(),
            steps: self.steps.clone(),
        }
    }

    pub fn input_format(&self) -> InputFormat {
        InputFormat::from_path(&self.input, self.layer.clone())
    }
}

impl JobConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ProcessingError::config(format!("invalid job file: {e}")))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ProcessingError::config(format!("invalid job file: {e}")))
    }

    /// Loads a `.json` or TOML job file and resolves its relative paths.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut job = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            _ => Self::from_toml_str(&text)?,
        };
        if let Some(base) = path.parent() {
            job.resolve_paths(base);
        }
        job.check_ids()?;
        debug!(layers = job.layers.len(), templates = job.templates.len(), "Loaded job file");
        Ok(job)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        self.templates.values_mut().for_each(resolve);
        self.aois.values_mut().for_each(resolve);
        for layer in &mut self.layers {
            resolve(&mut layer.input);
            resolve(&mut layer.output);
        }
    }

    /// Layer ids name outputs in reports, so they must be unique.
    pub fn check_ids(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.id.as_str()) {
                return Err(ProcessingError::config(format!("duplicate layer id '{}'", layer.id)));
            }
        }
        Ok(())
    }

    /// Reads every template raster through `reader`.
    pub fn load_templates(&self, reader: &impl RasterReader) -> Result<TemplateRegistry> {
        let mut registry = TemplateRegistry::new();
        for (id, path) in &self.templates {
            let template = reader.read_raster(&read_source("template", id, path)?)?;
            debug!(
                template = %id,
                width = template.meta().width,
                height = template.meta().height,
                "Loaded template"
            );
            registry.insert(id.clone(), template);
        }
        Ok(registry)
    }

    /// Reads every area of interest through `reader` into `registry`.
    pub fn load_aois(
        &self,
        reader: &impl VectorReader,
        registry: &mut TemplateRegistry,
    ) -> Result<()> {
        for (id, path) in &self.aois {
            let aoi = reader.read_vector(&read_source("aoi", id, path)?)?.into_selected(None)?;
            debug!(aoi = %id, features = aoi.features.len(), "Loaded area of interest");
            registry.insert_aoi(id.clone(), aoi);
        }
        Ok(())
    }
}

fn read_source(kind: &str, id: &str, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        let context = format!("{kind} '{id}' at {}: {e}", path.display());
        std::io::Error::new(e.kind(), context).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::raster_io::TiffCompression;
    use crate::preprocessing::vector::RasterizeMode;

    const JOB: &str = r#"
        workers = 2

        [templates]
        dem = "dem.tif"

        [aois]
        basin = "basin.geojson"

        [writer]
        compression = "lzw"
        compatibility_mode = true

        [[layers]]
        id = "faults"
        input = "faults.geojson"
        layer = "faults"
        template = "dem"
        output = "/data/out/faults.tif"
        steps = [{ step = "rasterize", mode = "binary" }]

        [[layers]]
        id = "slope"
        input = "slope.tif"
        template = "dem"
        output = "out/slope.tif"
        steps = [
            { step = "coregister" },
            { step = "clip", aoi = "basin", crop = false },
            { step = "transform", method = "minmax" },
        ]
    "#;

    #[test]
    fn test_toml_job() {
        let job = JobConfig::from_toml_str(JOB).unwrap();
        assert_eq!(job.workers, Some(2));
        assert_eq!(job.writer.compression, TiffCompression::Lzw);
        assert!(job.writer.compatibility_mode);
        assert_eq!(job.layers.len(), 2);
        assert_eq!(
            job.layers[0].input_format(),
            InputFormat::Vector {
                layer: Some("faults".to_string())
            }
        );
        assert_eq!(job.layers[1].input_format(), InputFormat::Raster);
        assert_eq!(
            job.layers[1].steps[1],
            PipelineStep::Clip {
                aoi: "basin".to_string(),
                crop: false
            }
        );
        assert!(matches!(
            job.layers[0].pipeline_config().steps[0],
            PipelineStep::Rasterize {
                mode: RasterizeMode::Binary,
                ..
            }
        ));
    }

    #[test]
    fn test_relative_paths_resolve_against_job_dir() {
        let mut job = JobConfig::from_toml_str(JOB).unwrap();
        job.resolve_paths(Path::new("/jobs/run1"));
        assert_eq!(job.templates["dem"], PathBuf::from("/jobs/run1/dem.tif"));
        assert_eq!(job.aois["basin"], PathBuf::from("/jobs/run1/basin.geojson"));
        assert_eq!(job.layers[0].output, PathBuf::from("/data/out/faults.tif"));
        assert_eq!(job.layers[1].output, PathBuf::from("/jobs/run1/out/slope.tif"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut job = JobConfig::from_toml_str(JOB).unwrap();
        job.layers[1].id = "faults".to_string();
        assert!(matches!(job.check_ids(), Err(ProcessingError::Config(_))));
    }

    #[test]
    fn test_json_job_and_bad_step() {
        let json = r#"{"layers": [{"id": "a", "input": "a.tif", "output": "b.tif",
            "steps": [{"step": "impute", "method": "median"}]}]}"#;
        let job = JobConfig::from_json_str(json).unwrap();
        assert_eq!(job.writer, WriterConfig::default());

        let bad = r#"{"layers": [{"id": "a", "input": "a.tif", "output": "b.tif",
            "steps": [{"step": "impute", "method": "mode"}]}]}"#;
        assert!(matches!(JobConfig::from_json_str(bad), Err(ProcessingError::Config(_))));
    }
}
