use std::io::{Cursor, Seek, Write};

use ndarray::Array2;
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder, TiffValue};
use tiff::tags::{Predictor, Tag};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::common::stats::is_missing;
use crate::preprocessing::grid::{ElementType, GridMetadata, RasterLayer};
use crate::preprocessing::raster_io::geokeys::{
    encode_crs, encode_transform, tag, TransformTags, GDAL_NODATA, GEO_ASCII_PARAMS,
    GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION,
};
use crate::preprocessing::raster_io::types::{TiffCompression, WriterConfig};
use crate::preprocessing::raster_io::writer::RasterWriter;

/// Writes each band as its own image directory carrying the full georeferencing.
pub struct GeoTiffWriter;

/// Tags repeated on every band's directory.
struct GeoTags {
    transform: TransformTags,
    key_directory: Vec<u16>,
    ascii: Option<String>,
    nodata: Option<String>,
}

impl GeoTags {
    fn new(meta: &GridMetadata, nodata: Option<f64>) -> Self {
        let keys = meta.crs.as_ref().map(encode_crs);
        let (key_directory, ascii) = match keys {
            Some(keys) => (keys.directory, keys.ascii),
            None => (Vec::new(), None),
        };
        Self {
            transform: encode_transform(&meta.transform),
            key_directory,
            ascii,
            nodata: nodata.map(format_nodata),
        }
    }
}

fn format_nodata(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

impl RasterWriter for GeoTiffWriter {
    fn write_raster(
        &self,
        layer: &RasterLayer,
        output: &mut dyn Write,
        config: &WriterConfig,
    ) -> Result<()> {
        let meta = layer.meta();
        debug!(
            "Encoding GeoTIFF: {}x{}, {} band(s), {}",
            meta.width,
            meta.height,
            layer.band_count(),
            meta.dtype
        );

        let (dtype, nodata, remap) = storage_type(meta, config.compatibility_mode);
        check_representable(layer, dtype, nodata, remap)?;

        let mut buffer: Vec<u8> = Vec::new();

        let compression = match config.compression {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        };

        let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(|e| ProcessingError::Encode(e.to_string()))?
            .with_compression(compression);

        if let Some(predictor_val) = config.predictor.filter(|_| dtype.is_integer()) {
            let predictor = match predictor_val {
                2 => Predictor::Horizontal,
                _ => Predictor::None,
            };
            encoder = encoder.with_predictor(predictor);
        }

        let tags = GeoTags::new(meta, nodata);
        let (width, height) = (meta.width as u32, meta.height as u32);

        for (index, band) in layer.bands().iter().enumerate() {
            let name = layer.band_names()[index].as_deref();
            let band = match remap {
                Some((from, to)) => band.mapv(|v| if is_missing(v, Some(from)) { to } else { v }),
                None => band.clone(),
            };
            let image = BandImage {
                tags: &tags,
                name,
                width,
                height,
            };

            match dtype {
                ElementType::UInt8 => {
                    image.write::<_, colortype::Gray8>(&mut encoder, &cells(&band, |v| v as u8))
                }
                ElementType::Int8 => {
                    image.write::<_, colortype::GrayI8>(&mut encoder, &cells(&band, |v| v as i8))
                }
                ElementType::UInt16 => {
                    image.write::<_, colortype::Gray16>(&mut encoder, &cells(&band, |v| v as u16))
                }
                ElementType::Int16 => {
                    image.write::<_, colortype::GrayI16>(&mut encoder, &cells(&band, |v| v as i16))
                }
                ElementType::UInt32 => {
                    image.write::<_, colortype::Gray32>(&mut encoder, &cells(&band, |v| v as u32))
                }
                ElementType::Int32 => {
                    image.write::<_, colortype::GrayI32>(&mut encoder, &cells(&band, |v| v as i32))
                }
                ElementType::UInt64 => {
                    image.write::<_, colortype::Gray64>(&mut encoder, &cells(&band, |v| v as u64))
                }
                ElementType::Int64 => {
                    image.write::<_, colortype::GrayI64>(&mut encoder, &cells(&band, |v| v as i64))
                }
                ElementType::Float32 => {
                    let data = cells(&band, |v| v as f32);
                    image.write::<_, colortype::Gray32Float>(&mut encoder, &data)
                }
                ElementType::Float64 => {
                    image.write::<_, colortype::Gray64Float>(&mut encoder, &cells(&band, |v| v))
                }
            }?;
            debug!(band = index, "Wrote band directory");
        }

        output.write_all(&buffer)?;

        debug!("GeoTIFF encoding complete, {} bytes", buffer.len());
        Ok(())
    }
}

/// Element type and sentinel as stored on disk, plus a sentinel remap when they differ
/// from the layer's own.
fn storage_type(
    meta: &GridMetadata,
    compatibility_mode: bool,
) -> (ElementType, Option<f64>, Option<(f64, f64)>) {
    if compatibility_mode && meta.dtype == ElementType::Int8 {
        let stored = ElementType::Int16.edge_value();
        let remap = meta.nodata.map(|sentinel| (sentinel, stored));
        debug!("Compatibility mode: storing int8 layer as int16");
        return (ElementType::Int16, meta.nodata.map(|_| stored), remap);
    }
    (meta.dtype, meta.nodata, None)
}

/// Every cell and the sentinel must survive the cast to the stored type.
fn check_representable(
    layer: &RasterLayer,
    dtype: ElementType,
    nodata: Option<f64>,
    remap: Option<(f64, f64)>,
) -> Result<()> {
    if let Some(sentinel) = nodata {
        if !storable(dtype, sentinel) {
            return Err(ProcessingError::Encode(format!(
                "nodata value {sentinel} cannot be stored as {dtype}"
            )));
        }
    }

    for (index, band) in layer.bands().iter().enumerate() {
        let bad = band.iter().find(|&&v| {
            let remapped = remap.is_some_and(|(from, _)| is_missing(v, Some(from)));
            !remapped && !storable(dtype, v)
        });
        if let Some(value) = bad {
            return Err(ProcessingError::Encode(format!(
                "band {index} holds {value}, which cannot be stored as {dtype}"
            )));
        }
    }
    Ok(())
}

/// Integers must be exact and in range; floats only need to be in range.
fn storable(dtype: ElementType, value: f64) -> bool {
    if dtype.is_float() {
        !value.is_finite() || dtype.contains_range(value, value)
    } else {
        dtype.can_represent(value)
    }
}

fn cells<T>(band: &Array2<f64>, cast: impl Fn(f64) -> T) -> Vec<T> {
    band.iter().map(|&v| cast(v)).collect()
}

struct BandImage<'a> {
    tags: &'a GeoTags,
    name: Option<&'a str>,
    width: u32,
    height: u32,
}

impl BandImage<'_> {
    fn write<W: Write + Seek, C: ColorType>(
        &self,
        encoder: &mut TiffEncoder<W>,
        data: &[C::Inner],
    ) -> Result<()>
    where
        [C::Inner]: TiffValue,
    {
        let encode_err = |e: tiff::TiffError| ProcessingError::Encode(e.to_string());

        let mut image = encoder.new_image::<C>(self.width, self.height).map_err(encode_err)?;
        let directory = image.encoder();

        match &self.tags.transform {
            TransformTags::ScaleTiepoint { scale, tiepoint } => {
                directory.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..]).map_err(encode_err)?;
                directory.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..]).map_err(encode_err)?;
            }
            TransformTags::Matrix(matrix) => {
                directory.write_tag(tag(MODEL_TRANSFORMATION), &matrix[..]).map_err(encode_err)?;
            }
        }
        if !self.tags.key_directory.is_empty() {
            directory
                .write_tag(tag(GEO_KEY_DIRECTORY), &self.tags.key_directory[..])
                .map_err(encode_err)?;
        }
        if let Some(ascii) = &self.tags.ascii {
            directory.write_tag(tag(GEO_ASCII_PARAMS), ascii.as_str()).map_err(encode_err)?;
        }
        if let Some(nodata) = &self.tags.nodata {
            directory.write_tag(tag(GDAL_NODATA), nodata.as_str()).map_err(encode_err)?;
        }
        if let Some(name) = self.name {
            directory.write_tag(Tag::ImageDescription, name).map_err(encode_err)?;
        }

        image.write_data(data).map_err(encode_err)
    }
}
