//! GeoJSON vector reader.
//!
//! Reads a `FeatureCollection` (or a single `Feature`) into a one-layer container.
//! A top-level JSON array of named feature collections is read as a multi-layer
//! container. The legacy named `crs` member is honoured; without it coordinates
//! are taken to be WGS 84 longitude/latitude.

use std::collections::BTreeMap;

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::grid::Crs;
use crate::preprocessing::vector::reader::VectorReader;
use crate::preprocessing::vector::types::{AttributeValue, Feature, VectorContainer, VectorLayer};

const DEFAULT_LAYER_NAME: &str = "features";

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Document {
    FeatureCollection(RawCollection),
    Feature(RawFeature),
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    name: Option<String>,
    crs: Option<RawCrs>,
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    id: Option<Value>,
    geometry: Option<Value>,
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawCrs {
    properties: RawCrsProperties,
}

#[derive(Debug, Deserialize)]
struct RawCrsProperties {
    name: String,
}

/// Reader for GeoJSON feature collections.
pub struct GeoJsonReader {
    layer_name: String,
}

impl Default for GeoJsonReader {
    fn default() -> Self {
        Self {
            layer_name: DEFAULT_LAYER_NAME.to_string(),
        }
    }
}

impl GeoJsonReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name given to a collection that does not carry its own `name` member.
    pub fn with_layer_name(mut self, name: impl Into<String>) -> Self {
        self.layer_name = name.into();
        self
    }

    fn read_document(&self, document: Document, fallback_name: String) -> Result<VectorLayer> {
        let (name, crs, raw_features) = match document {
            Document::FeatureCollection(collection) => {
                let crs = match collection.crs {
                    Some(raw) => raw
                        .properties
                        .name
                        .parse::<Crs>()
                        .map_err(|e| ProcessingError::Decode(format!("invalid crs member: {e}")))?,
                    None => Crs::WGS84,
                };
                (collection.name.unwrap_or(fallback_name), crs, collection.features)
            }
            Document::Feature(feature) => (fallback_name, Crs::WGS84, vec![feature]),
        };

        let features = raw_features
            .into_iter()
            .enumerate()
            .map(|(index, raw)| convert_feature(index, raw))
            .collect::<Result<Vec<_>>>()?;

        debug!(layer = %name, features = features.len(), crs = %crs, "Read GeoJSON layer");
        Ok(VectorLayer::new(name, Some(crs), features))
    }
}

impl VectorReader for GeoJsonReader {
    fn read_vector(&self, data: &[u8]) -> Result<VectorContainer> {
        debug!("Decoding GeoJSON, {} bytes", data.len());
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| ProcessingError::Decode(format!("invalid JSON: {e}")))?;

        let decode = |value: Value| {
            serde_json::from_value::<Document>(value).map_err(|e| {
                ProcessingError::Decode(format!("not a GeoJSON feature collection: {e}"))
            })
        };

        let layers = match value {
            Value::Array(documents) => documents
                .into_iter()
                .enumerate()
                .map(|(i, document)| {
                    self.read_document(decode(document)?, format!("{}_{i}", self.layer_name))
                })
                .collect::<Result<Vec<_>>>()?,
            document => vec![self.read_document(decode(document)?, self.layer_name.clone())?],
        };
        Ok(VectorContainer::new(layers))
    }
}

fn convert_feature(index: usize, raw: RawFeature) -> Result<Feature> {
    let id = raw.id.map(|id| match id {
        Value::String(text) => text,
        other => other.to_string(),
    });
    let label = id.clone().unwrap_or_else(|| format!("#{index}"));

    let geometry = match raw.geometry {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            parse_geometry(&value).map_err(|message| ProcessingError::geometry(label, message))?,
        ),
    };

    let attributes: BTreeMap<String, AttributeValue> = raw
        .properties
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, attribute_value(value)))
        .collect();

    Ok(Feature {
        id,
        geometry,
        attributes,
    })
}

fn attribute_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Number),
        Value::String(text) => AttributeValue::Text(text),
        other => AttributeValue::Text(other.to_string()),
    }
}

type ParseResult<T> = std::result::Result<T, String>;

fn parse_geometry(value: &Value) -> ParseResult<Geometry<f64>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or("geometry has no type")?;

    if kind == "GeometryCollection" {
        let members = value
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or("GeometryCollection has no geometries array")?;
        let geometries = members.iter().map(parse_geometry).collect::<ParseResult<Vec<_>>>()?;
        return Ok(Geometry::GeometryCollection(GeometryCollection::new_from(geometries)));
    }

    let coordinates = value
        .get("coordinates")
        .ok_or_else(|| format!("{kind} has no coordinates"))?;

    let geometry = match kind {
        "Point" => Geometry::Point(Point(position(coordinates)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint::new(
            positions(coordinates)?.into_iter().map(Point).collect(),
        )),
        "LineString" => Geometry::LineString(line_string(coordinates)?),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString::new(
            array(coordinates)?.iter().map(line_string).collect::<ParseResult<_>>()?,
        )),
        "Polygon" => Geometry::Polygon(polygon(coordinates)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon::new(
            array(coordinates)?.iter().map(polygon).collect::<ParseResult<_>>()?,
        )),
        other => return Err(format!("unsupported geometry type '{other}'")),
    };
    Ok(geometry)
}

fn array(value: &Value) -> ParseResult<&Vec<Value>> {
    value.as_array().ok_or_else(|| format!("expected an array, found {value}"))
}

fn position(value: &Value) -> ParseResult<Coord<f64>> {
    let items = array(value)?;
    match items.as_slice() {
        [x, y, ..] => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => Ok(Coord { x, y }),
            _ => Err(format!("position {value} is not numeric")),
        },
        _ => Err(format!("position {value} needs at least two values")),
    }
}

fn positions(value: &Value) -> ParseResult<Vec<Coord<f64>>> {
    array(value)?.iter().map(position).collect()
}

fn line_string(value: &Value) -> ParseResult<LineString<f64>> {
    let coords = positions(value)?;
    if coords.len() < 2 {
        return Err("a LineString needs at least two positions".to_string());
    }
    Ok(LineString::new(coords))
}

fn polygon(value: &Value) -> ParseResult<Polygon<f64>> {
    let mut rings = array(value)?
        .iter()
        .map(|ring| {
            let coords = positions(ring)?;
            if coords.len() < 4 {
                return Err("a polygon ring needs at least four positions".to_string());
            }
            Ok(LineString::new(coords))
        })
        .collect::<ParseResult<Vec<_>>>()?;
    if rings.is_empty() {
        return Err("a Polygon needs an exterior ring".to_string());
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(json: &str) -> Result<VectorContainer> {
        GeoJsonReader::new().with_layer_name("faults").read_vector(json.as_bytes())
    }

    #[test]
    fn test_feature_collection() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 7,
                 "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
                 "properties": {"kind": "fault", "length": 12.5, "active": true}},
                {"type": "Feature", "geometry": {"type": "Polygon",
                 "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}, "properties": null}
            ]
        }"#;
        let container = read(json).unwrap();
        let layer = container.select(None).unwrap();
        assert_eq!(layer.name, "faults");
        assert_eq!(layer.crs, Some(Crs::WGS84));
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.features[0].id.as_deref(), Some("7"));
        assert_eq!(layer.features[0].attribute("length"), &AttributeValue::Number(12.5));
        assert_eq!(layer.features[0].attribute("active"), &AttributeValue::Bool(true));
        assert!(matches!(layer.features[1].geometry, Some(Geometry::Polygon(_))));
    }

    #[test]
    fn test_named_crs_member() {
        let json = r#"{"type": "FeatureCollection", "name": "dikes",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32633"}},
            "features": []}"#;
        let container = read(json).unwrap();
        let layer = container.select(None).unwrap();
        assert_eq!(layer.name, "dikes");
        assert_eq!(layer.crs, Some(Crs::Epsg(32633)));
    }

    #[test]
    fn test_bad_geometry_reports_feature_id() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "id": "f-9", "properties": {},
             "geometry": {"type": "LineString", "coordinates": [[0, 0]]}}
        ]}"#;
        match read(json) {
            Err(ProcessingError::Geometry { feature, .. }) => assert_eq!(feature, "f-9"),
            other => panic!("expected a geometry error, got {other:?}"),
        }
    }

    #[test]
    fn test_array_is_multi_layer_container() {
        let json = r#"[
            {"type": "FeatureCollection", "name": "faults", "features": []},
            {"type": "FeatureCollection", "name": "dikes", "features": []}
        ]"#;
        let container = read(json).unwrap();
        assert_eq!(container.layer_names(), vec!["faults", "dikes"]);
        assert!(matches!(container.select(None), Err(ProcessingError::Config(_))));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        assert!(matches!(read("{not json"), Err(ProcessingError::Decode(_))));
        assert!(matches!(read(r#"{"type": "Topology"}"#), Err(ProcessingError::Decode(_))));
    }
}
