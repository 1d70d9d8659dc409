use crate::preprocessing::common::error::Result;
use crate::preprocessing::grid::RasterLayer;

pub trait RasterReader {
    fn read_raster(&self, data: &[u8]) -> Result<RasterLayer>;
}
