use ndarray::Array2;
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::is_missing;
use crate::preprocessing::grid::metadata::GridMetadata;
use crate::preprocessing::grid::types::ElementType;
use crate::preprocessing::normalize::{normalize, NormalizeOptions};
use crate::preprocessing::operation::BandOperation;

/// One or more 2-D bands sharing a single grid registration and nodata sentinel.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    bands: Vec<Array2<f64>>,
    band_names: Vec<Option<String>>,
    meta: GridMetadata,
}

impl RasterLayer {
    /// Builds a layer, checking every band against the metadata's shape.
    ///
    /// `meta.count` is overwritten with the number of bands.
    pub fn new(bands: Vec<Array2<f64>>, mut meta: GridMetadata) -> Result<Self> {
        if bands.is_empty() {
            return Err(ProcessingError::data("a raster layer needs at least one band"));
        }
        for (index, band) in bands.iter().enumerate() {
            if band.dim() != meta.shape() {
                return Err(ProcessingError::data(format!(
                    "band {} has shape {:?}, grid expects {:?}",
                    index,
                    band.dim(),
                    meta.shape()
                )));
            }
        }
        meta.count = bands.len();
        let band_names = vec![None; bands.len()];
        Ok(Self {
            bands,
            band_names,
            meta,
        })
    }

    pub fn single_band(band: Array2<f64>, meta: GridMetadata) -> Result<Self> {
        Self::new(vec![band], meta)
    }

    pub fn with_band_names(mut self, names: Vec<Option<String>>) -> Self {
        if names.len() == self.bands.len() {
            self.band_names = names;
        }
        self
    }

    pub fn bands(&self) -> &[Array2<f64>] {
        &self.bands
    }

    pub fn band(&self, index: usize) -> Option<&Array2<f64>> {
        self.bands.get(index)
    }

    pub fn band_names(&self) -> &[Option<String>] {
        &self.band_names
    }

    pub fn meta(&self) -> &GridMetadata {
        &self.meta
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn into_parts(self) -> (Vec<Array2<f64>>, GridMetadata) {
        (self.bands, self.meta)
    }

    pub fn is_missing(&self, value: f64) -> bool {
        is_missing(value, self.meta.nodata)
    }

    pub fn missing_count(&self) -> usize {
        self.bands
            .iter()
            .flat_map(|band| band.iter())
            .filter(|&&v| self.is_missing(v))
            .count()
    }

    /// Cells where the first band holds data. Used as a footprint mask.
    pub fn valid_mask(&self) -> Array2<bool> {
        self.bands[0].mapv(|v| !self.is_missing(v))
    }

    /// Applies an elementwise operation to each band independently, keeps band order,
    /// and normalizes the recombined layer.
    pub fn map_bands(&self, operation: &dyn BandOperation) -> Result<RasterLayer> {
        let mut bands = Vec::with_capacity(self.bands.len());
        for (index, band) in self.bands.iter().enumerate() {
            debug!(band = index, operation = operation.name(), "Applying band operation");
            bands.push(operation.apply(band, &self.meta)?);
        }

        let produced_missing = bands.iter().any(|band| band.iter().any(|v| v.is_nan()));
        let mut meta = self.meta.clone();
        if operation.produces_float() {
            meta.dtype = ElementType::Float64;
        }
        meta.nodata = if produced_missing || self.meta.nodata.is_some() {
            Some(f64::NAN)
        } else {
            None
        };

        let layer = RasterLayer {
            bands,
            band_names: self.band_names.clone(),
            meta,
        };
        Ok(normalize(
            layer,
            NormalizeOptions {
                retire_unused_nodata: operation.retires_nodata(),
            },
        ))
    }

    /// Replaces bands and metadata without re-validating. Callers keep the shape invariant.
    pub(crate) fn from_parts_unchecked(
        bands: Vec<Array2<f64>>,
        band_names: Vec<Option<String>>,
        meta: GridMetadata,
    ) -> Self {
        Self {
            bands,
            band_names,
            meta,
        }
    }

    pub(crate) fn into_all_parts(self) -> (Vec<Array2<f64>>, Vec<Option<String>>, GridMetadata) {
        (self.bands, self.band_names, self.meta)
    }
}
