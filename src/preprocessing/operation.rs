//! The shared contract of elementwise preprocessing steps.

use ndarray::Array2;

use crate::preprocessing::common::error::Result;
use crate::preprocessing::grid::GridMetadata;

/// A step that maps one band to a new band of the same shape.
///
/// Implementations read missing cells through `meta.nodata` (NaN always counts as
/// missing) and mark missing output cells with NaN. The caller recombines bands and
/// runs the normalizer, which assigns the final sentinel and element type.
pub trait BandOperation {
    fn name(&self) -> &'static str;

    fn apply(&self, band: &Array2<f64>, meta: &GridMetadata) -> Result<Array2<f64>>;

    /// Whether the layer's sentinel should be dropped when no missing cell remains.
    fn retires_nodata(&self) -> bool {
        false
    }

    /// Whether results are continuous measurements even for integer input.
    fn produces_float(&self) -> bool {
        false
    }
}
