//! GeoTIFF georeferencing tags and the GeoKey directory.

use tiff::tags::Tag;

use crate::preprocessing::grid::{Crs, GeoTransform};

pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const MODEL_TRANSFORMATION: u16 = 34264;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GEO_ASCII_PARAMS: u16 = 34737;
pub(crate) const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_CITATION: u16 = 2049;
const PROJECTED_CS_TYPE: u16 = 3072;
const PCS_CITATION: u16 = 3073;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Tag for a numeric code, resolved the same way the decoder resolves it.
pub(crate) fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Encoded GeoKey directory plus the ASCII parameters it points into.
pub(crate) struct GeoKeys {
    pub directory: Vec<u16>,
    pub ascii: Option<String>,
}

pub(crate) fn encode_crs(crs: &Crs) -> GeoKeys {
    let geographic = crs.is_geographic();
    let model_type = if geographic {
        MODEL_TYPE_GEOGRAPHIC
    } else {
        MODEL_TYPE_PROJECTED
    };
    let code_key = if geographic { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };

    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE, 0, 1, model_type],
        [GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA],
    ];
    let mut ascii = None;

    match crs.epsg().and_then(|code| u16::try_from(code).ok()).filter(|&code| code < USER_DEFINED) {
        Some(code) => entries.push([code_key, 0, 1, code]),
        None => {
            // Codes that do not fit a GeoKey travel as a citation string
            let citation = format!("{crs}|");
            entries.push([GT_CITATION, GEO_ASCII_PARAMS, citation.len() as u16, 0]);
            entries.push([code_key, 0, 1, USER_DEFINED]);
            ascii = Some(citation);
        }
    }

    let mut directory = vec![1, 1, 0, entries.len() as u16];
    directory.extend(entries.into_iter().flatten());
    GeoKeys { directory, ascii }
}

pub(crate) fn decode_crs(directory: &[u16], ascii: Option<&str>) -> Option<Crs> {
    let entries: Vec<&[u16]> = directory.get(4..)?.chunks_exact(4).collect();
    let value_of = |key: u16| {
        entries
            .iter()
            .find(|entry| entry[0] == key && entry[1] == 0)
            .map(|entry| entry[3])
    };

    for key in [PROJECTED_CS_TYPE, GEOGRAPHIC_TYPE] {
        if let Some(code) = value_of(key).filter(|&code| code != 0 && code != USER_DEFINED) {
            return Some(Crs::Epsg(code as u32));
        }
    }

    let ascii = ascii?;
    [GT_CITATION, PCS_CITATION, GEOG_CITATION].into_iter().find_map(|key| {
        let entry = entries
            .iter()
            .find(|entry| entry[0] == key && entry[1] == GEO_ASCII_PARAMS)?;
        let (count, offset) = (entry[2] as usize, entry[3] as usize);
        let citation = ascii.get(offset..offset + count)?;
        citation.trim_end_matches(['|', '\0']).parse::<Crs>().ok()
    })
}

pub(crate) enum TransformTags {
    /// North-up: pixel scale plus one tie point at the upper-left corner.
    ScaleTiepoint { scale: Vec<f64>, tiepoint: Vec<f64> },
    /// Full 4x4 model transformation, for rotated or sheared grids.
    Matrix(Vec<f64>),
}

pub(crate) fn encode_transform(transform: &GeoTransform) -> TransformTags {
    let t = transform;
    if t.is_north_up() && t.a > 0.0 && t.e < 0.0 {
        TransformTags::ScaleTiepoint {
            scale: vec![t.a, -t.e, 0.0],
            tiepoint: vec![0.0, 0.0, 0.0, t.c, t.f, 0.0],
        }
    } else {
        TransformTags::Matrix(vec![
            t.a, t.b, 0.0, t.c, //
            t.d, t.e, 0.0, t.f, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }
}

pub(crate) fn decode_transform(
    scale: Option<&[f64]>,
    tiepoint: Option<&[f64]>,
    matrix: Option<&[f64]>,
) -> Option<GeoTransform> {
    if let Some(m) = matrix.filter(|m| m.len() >= 16) {
        return Some(GeoTransform::new(m[0], m[1], m[3], m[4], m[5], m[7]));
    }
    match (scale, tiepoint) {
        (Some([sx, sy, ..]), Some([i, j, _, x, y, ..])) => {
            Some(GeoTransform::new(*sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy))
        }
        _ => None,
    }
}
