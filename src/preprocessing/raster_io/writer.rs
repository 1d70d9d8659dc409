use std::io::Write;

use crate::preprocessing::common::error::Result;
use crate::preprocessing::grid::RasterLayer;
use crate::preprocessing::raster_io::types::WriterConfig;

pub trait RasterWriter {
    fn write_raster(
        &self,
        layer: &RasterLayer,
        output: &mut dyn Write,
        config: &WriterConfig,
    ) -> Result<()>;
}
