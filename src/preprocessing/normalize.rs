//! Nodata/type normalizer
//!
//! Recomputes the narrowest element type for a layer's valid values and a nodata
//! sentinel that cannot collide with them, then casts every band accordingly.

use tracing::debug;

use crate::preprocessing::common::stats::is_missing;
use crate::preprocessing::grid::{ElementType, RasterLayer};

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Drop the sentinel entirely when no cell is missing.
    pub retire_unused_nodata: bool,
}

/// Normalizes a whole layer: one element type and one sentinel for all bands.
///
/// Integer layers stay integer while every valid value is integral; anything else is
/// stored as `float32` when the range fits, `float64` otherwise. A layer without any
/// valid cell keeps its element type; its sentinel is kept when the type can hold it
/// and replaced by the type's edge value otherwise.
pub fn normalize(layer: RasterLayer, options: NormalizeOptions) -> RasterLayer {
    let (bands, band_names, mut meta) = layer.into_all_parts();
    let nodata = meta.nodata;

    let mut range: Option<(f64, f64)> = None;
    let mut integral = true;
    let mut missing = 0usize;
    for &value in bands.iter().flat_map(|band| band.iter()) {
        if is_missing(value, nodata) {
            missing += 1;
            continue;
        }
        integral &= value.is_finite() && value.fract() == 0.0;
        range = Some(match range {
            None => (value, value),
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
        });
    }

    let Some((min, max)) = range else {
        let sentinel = match nodata {
            Some(value) if !value.is_nan() && meta.dtype.can_represent(value) => value,
            _ => meta.dtype.edge_value(),
        };
        debug!(dtype = %meta.dtype, nodata = sentinel, "All cells are nodata");
        let bands = bands.into_iter().map(|band| band.mapv_into(|_| sentinel)).collect();
        meta.nodata = Some(sentinel);
        return RasterLayer::from_parts_unchecked(bands, band_names, meta);
    };

    let mut dtype = minimal_type(min, max, meta.dtype.is_integer() && integral);
    let keep_sentinel = missing > 0 || (nodata.is_some() && !options.retire_unused_nodata);
    let sentinel = if keep_sentinel {
        let (widened, value) = sentinel_for(dtype, min, max);
        dtype = widened;
        Some(value)
    } else {
        None
    };

    let fill = sentinel.unwrap_or(f64::NAN);
    let bands = bands
        .into_iter()
        .map(|band| {
            band.mapv_into(|v| {
                if is_missing(v, nodata) {
                    fill
                } else {
                    dtype.cast(v)
                }
            })
        })
        .collect();

    debug!(
        dtype = %dtype,
        nodata = ?sentinel,
        missing,
        min,
        max,
        "Normalized layer"
    );

    meta.dtype = dtype;
    meta.nodata = sentinel;
    RasterLayer::from_parts_unchecked(bands, band_names, meta)
}

/// Narrowest type holding `[min, max]`.
pub fn minimal_type(min: f64, max: f64, integer: bool) -> ElementType {
    if integer {
        if let Some(dtype) = ElementType::INTEGER_LADDER
            .iter()
            .copied()
            .find(|dtype| dtype.contains_range(min, max))
        {
            return dtype;
        }
    }
    if ElementType::Float32.contains_range(min, max) {
        ElementType::Float32
    } else {
        ElementType::Float64
    }
}

/// Edge value of `dtype`, widening the type while the edge equals a data extreme.
///
/// Falls back to `float64` with a NaN sentinel when even the widest type collides.
pub fn sentinel_for(dtype: ElementType, min: f64, max: f64) -> (ElementType, f64) {
    let mut dtype = dtype;
    loop {
        let edge = dtype.edge_value();
        if dtype.cast(min) != edge && dtype.cast(max) != edge {
            return (dtype, edge);
        }
        let wider = dtype.widen();
        if wider == dtype {
            break;
        }
        dtype = wider;
    }
    (ElementType::Float64, f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::grid::{GeoTransform, GridMetadata};
    use ndarray::{array, Array2};

    fn layer(band: Array2<f64>, dtype: ElementType, nodata: Option<f64>) -> RasterLayer {
        let (rows, cols) = band.dim();
        let transform = GeoTransform::from_origin(0.0, rows as f64, 1.0, 1.0);
        let meta = GridMetadata::new(transform, None, cols, rows)
            .with_dtype(dtype)
            .with_nodata(nodata);
        RasterLayer::single_band(band, meta).unwrap()
    }

    #[test]
    fn test_integer_layer_shrinks_to_uint8() {
        let input = layer(array![[0.0, 1.0], [2.0, 200.0]], ElementType::Int32, None);
        let out = normalize(input, Default::default());
        assert_eq!(out.meta().dtype, ElementType::UInt8);
        assert_eq!(out.meta().nodata, None);
    }

    #[test]
    fn test_negative_integers_pick_signed_type() {
        let input = layer(array![[-5.0, 100.0]], ElementType::Int64, None);
        let out = normalize(input, Default::default());
        assert_eq!(out.meta().dtype, ElementType::Int8);
    }

    #[test]
    fn test_float_layer_stays_float() {
        let input = layer(array![[1.0, 2.0, 3.0]], ElementType::Float64, None);
        let out = normalize(input, Default::default());
        assert_eq!(out.meta().dtype, ElementType::Float32);
    }

    #[test]
    fn test_missing_cells_receive_edge_sentinel() {
        let input = layer(array![[1.5, f64::NAN]], ElementType::Float64, Some(f64::NAN));
        let out = normalize(input, Default::default());
        assert_eq!(out.meta().dtype, ElementType::Float32);
        assert_eq!(out.meta().nodata, Some(f32::MIN as f64));
        assert_eq!(out.bands()[0][[0, 1]], f32::MIN as f64);
    }

    #[test]
    fn test_sentinel_collision_widens_type() {
        let out = normalize(
            layer(array![[0.0, 255.0, -1.0]], ElementType::UInt16, Some(-1.0)),
            Default::default(),
        );
        assert_eq!(out.meta().dtype, ElementType::UInt16);
        assert_eq!(out.meta().nodata, Some(65535.0));
        assert_eq!(out.bands()[0][[0, 2]], 65535.0);
    }

    #[test]
    fn test_unused_sentinel_retired_on_request() {
        let input = layer(array![[1.0, 2.0]], ElementType::Float64, Some(-9999.0));
        let kept = normalize(input.clone(), Default::default());
        assert!(kept.meta().nodata.is_some());
        let retired = normalize(input, NormalizeOptions { retire_unused_nodata: true });
        assert_eq!(retired.meta().nodata, None);
    }

    #[test]
    fn test_all_nodata_layer_is_unchanged() {
        let input = layer(array![[-1.0, -1.0]], ElementType::Int16, Some(-1.0));
        let out = normalize(input, Default::default());
        assert_eq!(out.meta().dtype, ElementType::Int16);
        assert_eq!(out.meta().nodata, Some(-1.0));
        assert_eq!(out.bands()[0], array![[-1.0, -1.0]]);
    }

    #[test]
    fn test_all_nodata_integer_layer_gets_storable_sentinel() {
        let input = layer(array![[f64::NAN, f64::NAN]], ElementType::UInt8, Some(f64::NAN));
        let out = normalize(input, Default::default());
        assert_eq!(out.meta().dtype, ElementType::UInt8);
        assert_eq!(out.meta().nodata, Some(255.0));
        assert_eq!(out.bands()[0], array![[255.0, 255.0]]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let band = array![[0.1, f64::NAN, 7.25], [3.0, -2.5, 1e6]];
        let input = layer(band, ElementType::Float64, Some(f64::NAN));
        let once = normalize(input, Default::default());
        let twice = normalize(once.clone(), Default::default());
        assert_eq!(once.meta().dtype, twice.meta().dtype);
        assert_eq!(once.meta().nodata, twice.meta().nodata);
        assert_eq!(once.bands()[0], twice.bands()[0]);
    }

    #[test]
    fn test_sentinel_fallback_for_widest_float() {
        let (widened, _) = sentinel_for(ElementType::Float32, f32::MIN as f64, 0.0);
        assert_eq!(widened, ElementType::Float64);
        let (dtype, value) = sentinel_for(ElementType::Float64, f64::MIN, 0.0);
        assert_eq!(dtype, ElementType::Float64);
        assert!(value.is_nan());
    }
}
