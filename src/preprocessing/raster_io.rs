//! GeoTIFF input and output
//!
//! Readers and writers sit behind traits so the pipeline can be driven by any
//! byte source; `GeoTiffReader` and `GeoTiffWriter` are the stock implementations.

mod geokeys;
mod geotiff_reader;
mod geotiff_writer;
mod reader;
pub mod types;
mod writer;

pub use geotiff_reader::GeoTiffReader;
pub use geotiff_writer::GeoTiffWriter;
pub use reader::RasterReader;
pub use types::{TiffCompression, WriterConfig, WriterConfigBuilder};
pub use writer::RasterWriter;
