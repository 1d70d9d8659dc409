use std::io::{Cursor, Read, Seek};

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::grid::{ElementType, GeoTransform, GridMetadata, RasterLayer};
use crate::preprocessing::raster_io::geokeys::{
    decode_crs, decode_transform, tag, GDAL_NODATA, GEO_ASCII_PARAMS, GEO_KEY_DIRECTORY,
    MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION,
};
use crate::preprocessing::raster_io::reader::RasterReader;

/// Reads single-channel GeoTIFFs, one band per image directory.
///
/// Georeferencing and nodata come from the first directory.
pub struct GeoTiffReader;

fn decode_err(e: tiff::TiffError) -> ProcessingError {
    ProcessingError::Decode(e.to_string())
}

impl RasterReader for GeoTiffReader {
    fn read_raster(&self, data: &[u8]) -> Result<RasterLayer> {
        debug!("Decoding GeoTIFF, {} bytes", data.len());
        let mut decoder = Decoder::new(Cursor::new(data))
            .map_err(decode_err)?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(decode_err)?;
        let transform = read_transform(&mut decoder)?.unwrap_or_else(|| {
            warn!("GeoTIFF has no georeferencing, using pixel coordinates");
            GeoTransform::from_origin(0.0, height as f64, 1.0, 1.0)
        });
        let crs = {
            let directory = read_tag(&mut decoder, GEO_KEY_DIRECTORY)?
                .map(|v| v.into_u16_vec())
                .transpose();
            let ascii = read_tag(&mut decoder, GEO_ASCII_PARAMS)?
                .map(|v| v.into_string())
                .transpose();
            match (directory.map_err(decode_err)?, ascii.map_err(decode_err)?) {
                (Some(directory), ascii) => decode_crs(&directory, ascii.as_deref()),
                (None, _) => None,
            }
        };
        let nodata = match read_tag(&mut decoder, GDAL_NODATA)? {
            Some(value) => {
                let text = value.into_string().map_err(decode_err)?;
                let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
                Some(text.parse::<f64>().map_err(|_| {
                    ProcessingError::Decode(format!("unreadable nodata value '{text}'"))
                })?)
            }
            None => None,
        };

        let mut bands = Vec::new();
        let mut names = Vec::new();
        let mut dtype = None;
        loop {
            let (band_width, band_height) = decoder.dimensions().map_err(decode_err)?;
            if (band_width, band_height) != (width, height) {
                return Err(ProcessingError::Decode(format!(
                    "band {} is {band_width}x{band_height}, first band is {width}x{height}",
                    bands.len()
                )));
            }
            match decoder.colortype().map_err(decode_err)? {
                tiff::ColorType::Gray(_) => {}
                other => {
                    return Err(ProcessingError::Decode(format!(
                        "unsupported color type {other:?}, expected single-channel bands"
                    )));
                }
            }

            let name = read_tag(&mut decoder, Tag::ImageDescription.to_u16())?
                .map(|v| v.into_string())
                .transpose()
                .map_err(decode_err)?;
            let (band_dtype, values) = decode_band(decoder.read_image().map_err(decode_err)?)?;
            if dtype.is_some_and(|dtype| dtype != band_dtype) {
                let message = "bands have different sample formats".to_string();
                return Err(ProcessingError::Decode(message));
            }
            dtype = Some(band_dtype);

            let band = Array2::from_shape_vec((height as usize, width as usize), values)
                .map_err(|e| ProcessingError::Decode(e.to_string()))?;
            bands.push(band);
            names.push(name);

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(decode_err)?;
        }

        let meta = GridMetadata::new(transform, crs, width as usize, height as usize)
            .with_dtype(dtype.unwrap_or(ElementType::Float64))
            .with_nodata(nodata);
        debug!(
            bands = bands.len(),
            dtype = %meta.dtype,
            crs = ?meta.crs,
            nodata = ?meta.nodata,
            "Decoded GeoTIFF"
        );
        Ok(RasterLayer::new(bands, meta)?.with_band_names(names))
    }
}

fn read_tag<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> Result<Option<tiff::decoder::ifd::Value>> {
    decoder.find_tag(tag(code)).map_err(decode_err)
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<GeoTransform>> {
    let mut floats = |code| -> Result<Option<Vec<f64>>> {
        read_tag(decoder, code)?
            .map(|v| v.into_f64_vec())
            .transpose()
            .map_err(decode_err)
    };
    let scale = floats(MODEL_PIXEL_SCALE)?;
    let tiepoint = floats(MODEL_TIEPOINT)?;
    let matrix = floats(MODEL_TRANSFORMATION)?;
    Ok(decode_transform(scale.as_deref(), tiepoint.as_deref(), matrix.as_deref()))
}

fn decode_band(result: DecodingResult) -> Result<(ElementType, Vec<f64>)> {
    fn widen<T: Copy + Into<f64>>(values: Vec<T>) -> Vec<f64> {
        values.into_iter().map(Into::into).collect()
    }

    let decoded = match result {
        DecodingResult::U8(v) => (ElementType::UInt8, widen(v)),
        DecodingResult::I8(v) => (ElementType::Int8, widen(v)),
        DecodingResult::U16(v) => (ElementType::UInt16, widen(v)),
        DecodingResult::I16(v) => (ElementType::Int16, widen(v)),
        DecodingResult::U32(v) => (ElementType::UInt32, widen(v)),
        DecodingResult::I32(v) => (ElementType::Int32, widen(v)),
        DecodingResult::U64(v) => {
            let samples = v.into_iter().map(|x| (x, x));
            (ElementType::UInt64, exact_cells(samples, |x| x as f64)?)
        }
        DecodingResult::I64(v) => {
            let samples = v.into_iter().map(|x| (x.unsigned_abs(), x));
            (ElementType::Int64, exact_cells(samples, |x| x as f64)?)
        }
        DecodingResult::F32(v) => (ElementType::Float32, widen(v)),
        DecodingResult::F64(v) => (ElementType::Float64, v),
        #[allow(unreachable_patterns)]
        _ => return Err(ProcessingError::Decode("unsupported sample format".to_string())),
    };
    Ok(decoded)
}

/// Every integer up to this magnitude converts to `f64` without rounding.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Converts 64-bit samples, rejecting any that a cell value would round.
fn exact_cells<T: std::fmt::Display>(
    samples: impl Iterator<Item = (u64, T)>,
    to_f64: fn(T) -> f64,
) -> Result<Vec<f64>> {
    samples
        .map(|(magnitude, sample)| {
            if magnitude <= MAX_EXACT_INTEGER {
                Ok(to_f64(sample))
            } else {
                Err(ProcessingError::data(format!(
                    "64-bit sample {sample} exceeds 2^53 and cannot be held exactly"
                )))
            }
        })
        .collect()
}
