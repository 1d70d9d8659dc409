use crate::preprocessing::common::error::Result;
use crate::preprocessing::vector::types::VectorContainer;

pub trait VectorReader {
    fn read_vector(&self, data: &[u8]) -> Result<VectorContainer>;
}
