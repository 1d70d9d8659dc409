//! Geospatial layer preprocessing
//!
//! Turns source rasters and vector feature collections into rasters registered to
//! a template grid. Steps cover value transforms, imputation, outlier clipping,
//! rasterization, proximity, dilation, clipping to an area of interest and
//! coregistration. The element type and nodata sentinel are recomputed after every step.

pub mod clip;
pub mod common;
pub mod coregister;
pub mod dilate;
pub mod grid;
pub mod impute;
pub mod normalize;
pub mod operation;
pub mod outlier;
pub mod pipeline;
pub mod proximity;
pub mod raster_io;
pub mod transform;
pub mod vector;

pub use common::{ErrorKind, PipelineError, ProcessingError, Result};

pub use grid::{Crs, ElementType, GeoTransform, GridMetadata, RasterLayer};

pub use raster_io::{
    GeoTiffReader, GeoTiffWriter, RasterReader, RasterWriter, TiffCompression, WriterConfig,
};

pub use vector::{GeoJsonReader, VectorContainer, VectorLayer, VectorReader};

pub use pipeline::{
    BatchRunner, JobConfig, LayerPipeline, Orchestrator, PipelineConfig, PipelineStep,
    TemplateRegistry,
};
