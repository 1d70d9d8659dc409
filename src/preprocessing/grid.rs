//! Grid metadata and raster layers
//!
//! Spatial registration (affine transform, CRS, shape), element types and the
//! multi-band `RasterLayer` every preprocessing step consumes and produces.

pub mod crs;
pub mod layer;
pub mod metadata;
pub mod types;

pub use crs::{Crs, CrsTransformer};
pub use layer::RasterLayer;
pub use metadata::{GeoTransform, GridMetadata};
pub use types::ElementType;
