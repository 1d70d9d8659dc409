//! Vector layers and their conversion to rasters
//!
//! Feature collections, attribute queries, reprojection into a template's CRS,
//! burning features into the template grid, and GeoJSON reading.

mod geojson_reader;
pub mod prepare;
pub mod query;
pub mod rasterize;
mod reader;
pub mod types;

pub use geojson_reader::GeoJsonReader;
pub use prepare::prepare_vector_layer;
pub use query::FeatureQuery;
pub use rasterize::{OverlapPolicy, RasterizeMode, Rasterizer};
pub use reader::VectorReader;
pub use types::{AttributeValue, Feature, VectorContainer, VectorLayer};
