//! Coregistration onto a template grid
//!
//! Every destination cell centre is carried from the template's CRS into the
//! source's CRS, then through the source's inverse transform to a fractional source
//! pixel. The mapping is computed once and shared by all bands.

mod resampling;

pub use resampling::ResamplingMethod;

use geo::Coord;
use ndarray::Array2;
use tracing::{debug, warn};

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::grid::{CrsTransformer, GridMetadata, RasterLayer};
use crate::preprocessing::normalize::{normalize, NormalizeOptions};

/// Fractional source pixel position of every destination cell; `None` outside the source.
pub struct PixelMapping {
    positions: Array2<Option<(f64, f64)>>,
}

impl PixelMapping {
    pub fn new(source: &GridMetadata, template: &GridMetadata) -> Result<Self> {
        let transformer = CrsTransformer::between(template.crs.as_ref(), source.crs.as_ref())?;
        let inverse = source.transform.inverse()?;
        let (width, height) = (source.width as f64, source.height as f64);

        let mut failed = 0usize;
        let positions = Array2::from_shape_fn(template.shape(), |(row, col)| {
            let (x, y) = template.transform.cell_center(col, row);
            let (x, y) = match transformer.transform(x, y) {
                Ok(point) => point,
                Err(_) => {
                    failed += 1;
                    return None;
                }
            };
            let pixel = inverse.apply(Coord { x, y });
            let inside = pixel.x >= 0.0 && pixel.y >= 0.0 && pixel.x < width && pixel.y < height;
            inside.then_some((pixel.x, pixel.y))
        });

        if failed > 0 {
            warn!(cells = failed, "Destination cells could not be projected into the source CRS");
        }
        Ok(Self { positions })
    }

    pub fn covered(&self) -> usize {
        self.positions.iter().filter(|p| p.is_some()).count()
    }

    fn resample(
        &self,
        band: &Array2<f64>,
        nodata: Option<f64>,
        method: ResamplingMethod,
    ) -> Array2<f64> {
        self.positions.mapv(|position| match position {
            Some((px, py)) => method.sample(band, nodata, px, py),
            None => f64::NAN,
        })
    }
}

/// Resamples `source` onto the grid described by `template`.
///
/// Without an explicit method, integer layers use nearest neighbour and float layers
/// bilinear. The result carries the template's transform, shape and CRS and the
/// source's band count; cells outside the source footprint are nodata.
pub fn coregister(
    source: &RasterLayer,
    template: &GridMetadata,
    method: Option<ResamplingMethod>,
) -> Result<RasterLayer> {
    let method = method.unwrap_or_else(|| ResamplingMethod::default_for(source.meta().dtype));
    if template.width == 0 || template.height == 0 {
        return Err(ProcessingError::data("template grid has no cells"));
    }

    let mapping = PixelMapping::new(source.meta(), template)?;
    debug!(
        method = ?method,
        covered = mapping.covered(),
        cells = template.width * template.height,
        "Computed pixel mapping"
    );

    let nodata = source.meta().nodata;
    let bands = source
        .bands()
        .iter()
        .map(|band| mapping.resample(band, nodata, method))
        .collect();

    let meta = template
        .grid_only()
        .with_dtype(source.meta().dtype)
        .with_nodata(Some(f64::NAN));
    let layer = RasterLayer::new(bands, meta)?.with_band_names(source.band_names().to_vec());
    Ok(normalize(layer, NormalizeOptions::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::grid::{Crs, ElementType, GeoTransform};
    use ndarray::array;

    fn web_grid(transform: GeoTransform, width: usize, height: usize) -> GridMetadata {
        GridMetadata::new(transform, Some(Crs::Epsg(3857)), width, height)
    }

    fn source(band: Array2<f64>, transform: GeoTransform, dtype: ElementType) -> RasterLayer {
        let (rows, cols) = band.dim();
        let meta = GridMetadata::new(transform, Some(Crs::Epsg(3857)), cols, rows)
            .with_dtype(dtype)
            .with_nodata(Some(255.0));
        RasterLayer::single_band(band, meta).unwrap()
    }

    #[test]
    fn test_aligned_nearest_is_identity() {
        let transform = GeoTransform::from_origin(0.0, 3.0, 1.0, 1.0);
        let band = array![[1.0, 2.0, 3.0], [4.0, 255.0, 6.0], [7.0, 8.0, 9.0]];
        let src = source(band, transform, ElementType::UInt8);
        let out = coregister(&src, src.meta(), None).unwrap();
        assert!(out.meta().is_aligned_with(src.meta()));
        let sentinel = out.meta().nodata.unwrap();
        assert_eq!(out.bands()[0], array![[1.0, 2.0, 3.0], [4.0, sentinel, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(out.meta().dtype, ElementType::UInt8);
    }

    #[test]
    fn test_cells_outside_source_are_nodata() {
        let src = source(
            array![[1.0, 2.0], [3.0, 4.0]],
            GeoTransform::from_origin(0.0, 2.0, 1.0, 1.0),
            ElementType::UInt8,
        );
        let template = web_grid(GeoTransform::from_origin(-1.0, 2.0, 1.0, 1.0), 4, 2);
        let out = coregister(&src, &template, Some(ResamplingMethod::Nearest)).unwrap();
        let sentinel = out.meta().nodata.unwrap();
        assert_eq!(out.meta().shape(), (2, 4));
        assert_eq!(out.meta().transform, template.transform);
        assert_eq!(
            out.bands()[0],
            array![[sentinel, 1.0, 2.0, sentinel], [sentinel, 3.0, 4.0, sentinel]]
        );
    }

    #[test]
    fn test_downsample_with_bilinear() {
        let src = source(
            array![[0.0, 2.0], [4.0, 6.0]],
            GeoTransform::from_origin(0.0, 2.0, 1.0, 1.0),
            ElementType::Float32,
        );
        let template = web_grid(GeoTransform::from_origin(0.0, 2.0, 2.0, 2.0), 1, 1);
        let out = coregister(&src, &template, None).unwrap();
        assert!((out.bands()[0][[0, 0]] - 3.0).abs() < 1e-6);
        assert!(out.meta().dtype.is_float());
    }

    #[test]
    fn test_multiband_shares_mapping() {
        let meta = web_grid(GeoTransform::from_origin(0.0, 1.0, 1.0, 1.0), 2, 1)
            .with_dtype(ElementType::Int16);
        let src = RasterLayer::new(vec![array![[1.0, 2.0]], array![[-3.0, -4.0]]], meta).unwrap();
        let template = web_grid(GeoTransform::from_origin(1.0, 1.0, 1.0, 1.0), 1, 1);
        let out = coregister(&src, &template, None).unwrap();
        assert_eq!(out.band_count(), 2);
        assert_eq!(out.bands()[0][[0, 0]], 2.0);
        assert_eq!(out.bands()[1][[0, 0]], -4.0);
    }

    #[test]
    fn test_reprojected_template() {
        // 1 degree cells around the origin, resampled onto a web mercator grid
        let transform = GeoTransform::from_origin(-2.0, 2.0, 1.0, 1.0);
        let meta =
            GridMetadata::new(transform, Some(Crs::WGS84), 4, 4).with_dtype(ElementType::UInt8);
        let band = array![
            [1.0, 1.0, 2.0, 2.0],
            [1.0, 1.0, 2.0, 2.0],
            [3.0, 3.0, 4.0, 4.0],
            [3.0, 3.0, 4.0, 4.0]
        ];
        let src = RasterLayer::single_band(band, meta).unwrap();
        let template = GridMetadata::new(
            GeoTransform::from_origin(-100_000.0, 100_000.0, 100_000.0, 100_000.0),
            Some(Crs::Epsg(3857)),
            2,
            2,
        );
        let out = coregister(&src, &template, None).unwrap();
        assert_eq!(out.bands()[0], array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(out.meta().crs, Some(Crs::Epsg(3857)));
    }

    #[test]
    fn test_missing_crs_on_both_sides() {
        let meta = GridMetadata::new(GeoTransform::from_origin(0.0, 1.0, 1.0, 1.0), None, 1, 1);
        let src = RasterLayer::single_band(array![[1.0]], meta.clone()).unwrap();
        assert!(matches!(coregister(&src, &meta, None), Err(ProcessingError::Config(_))));
    }

    #[test]
    fn test_singular_source_transform_is_data_error() {
        let singular = GeoTransform::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let meta = GridMetadata::new(singular, Some(Crs::WGS84), 1, 1);
        let src = RasterLayer::single_band(array![[1.0]], meta).unwrap();
        let transform = GeoTransform::from_origin(0.0, 1.0, 1.0, 1.0);
        let template = GridMetadata::new(transform, Some(Crs::WGS84), 1, 1);
        assert!(matches!(coregister(&src, &template, None), Err(ProcessingError::Data(_))));
    }
}
