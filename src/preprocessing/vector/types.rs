use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use geo::Geometry;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::grid::Crs;

/// A single attribute cell of a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Numeric view of the value. Text is parsed; booleans map to 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Number(n) if n.is_nan() => None,
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Ordering used to list categories: booleans, then numbers, then text.
    pub fn total_cmp(&self, other: &AttributeValue) -> Ordering {
        fn rank(value: &AttributeValue) -> u8 {
            match value {
                AttributeValue::Null => 0,
                AttributeValue::Bool(_) => 1,
                AttributeValue::Number(_) => 2,
                AttributeValue::Text(_) => 3,
            }
        }
        match (self, other) {
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a.cmp(b),
            (AttributeValue::Number(a), AttributeValue::Number(b)) => a.total_cmp(b),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("null"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Feature {
    pub id: Option<String>,
    pub geometry: Option<Geometry<f64>>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            id: None,
            geometry: Some(geometry),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(
        mut self,
        column: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    /// Missing columns read as `Null`.
    pub fn attribute(&self, column: &str) -> &AttributeValue {
        static NULL: AttributeValue = AttributeValue::Null;
        self.attributes.get(column).unwrap_or(&NULL)
    }

    /// Identifier used in error reports: the feature id, or `#<index>` without one.
    pub fn label(&self, index: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("#{index}"),
        }
    }
}

/// An ordered feature collection in a single CRS.
#[derive(Debug, Clone)]
pub struct VectorLayer {
    pub name: String,
    pub crs: Option<Crs>,
    pub features: Vec<Feature>,
}

impl VectorLayer {
    pub fn new(name: impl Into<String>, crs: Option<Crs>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            crs,
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Every attribute column present on at least one feature.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.features
            .iter()
            .flat_map(|feature| feature.attributes.keys().map(String::as_str))
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.features
            .iter()
            .any(|feature| feature.attributes.contains_key(column))
    }

    /// Distinct non-null values of `column`, sorted.
    pub fn distinct_values(&self, column: &str) -> Vec<AttributeValue> {
        let mut values: Vec<AttributeValue> = Vec::new();
        for feature in &self.features {
            let value = feature.attribute(column);
            if value.is_null() || values.contains(value) {
                continue;
            }
            values.push(value.clone());
        }
        values.sort_by(AttributeValue::total_cmp);
        values
    }
}

/// One or more named layers read from a single vector source.
#[derive(Debug, Clone, Default)]
pub struct VectorContainer {
    pub layers: Vec<VectorLayer>,
}

impl VectorContainer {
    pub fn new(layers: Vec<VectorLayer>) -> Self {
        Self { layers }
    }

    pub fn single(layer: VectorLayer) -> Self {
        Self { layers: vec![layer] }
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name.as_str()).collect()
    }

    /// Picks a layer by name. Without a name the container must hold exactly one layer.
    pub fn select(&self, name: Option<&str>) -> Result<&VectorLayer> {
        match name {
            Some(name) => self
                .layers
                .iter()
                .find(|layer| layer.name == name)
                .ok_or_else(|| {
                    ProcessingError::config(format!(
                        "no vector layer named '{name}' (available: {:?})",
                        self.layer_names()
                    ))
                }),
            None => match self.layers.as_slice() {
                [layer] => Ok(layer),
                [] => Err(ProcessingError::data("vector source contains no layers")),
                _ => Err(ProcessingError::config(format!(
                    "vector source holds {} layers {:?}; a layer name is required",
                    self.layers.len(),
                    self.layer_names()
                ))),
            },
        }
    }

    pub fn into_selected(self, name: Option<&str>) -> Result<VectorLayer> {
        let index = {
            let selected = self.select(name)?;
            self.layers
                .iter()
                .position(|layer| std::ptr::eq(layer, selected))
                .unwrap_or(0)
        };
        let mut layers = self.layers;
        Ok(layers.swap_remove(index))
    }
}
