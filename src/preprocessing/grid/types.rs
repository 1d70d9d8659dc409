//! Raster element types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric representation of a raster's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

impl ElementType {
    /// Integer types ordered from narrowest to widest.
    pub const INTEGER_LADDER: [ElementType; 8] = [
        ElementType::UInt8,
        ElementType::Int8,
        ElementType::UInt16,
        ElementType::Int16,
        ElementType::UInt32,
        ElementType::Int32,
        ElementType::UInt64,
        ElementType::Int64,
    ];

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::Float32 | ElementType::Float64)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            ElementType::UInt8 | ElementType::UInt16 | ElementType::UInt32 | ElementType::UInt64
        )
    }

    pub fn bits(self) -> u16 {
        match self {
            ElementType::UInt8 | ElementType::Int8 => 8,
            ElementType::UInt16 | ElementType::Int16 => 16,
            ElementType::UInt32 | ElementType::Int32 | ElementType::Float32 => 32,
            ElementType::UInt64 | ElementType::Int64 | ElementType::Float64 => 64,
        }
    }

    /// Smallest and largest finite value of the type.
    pub fn range(self) -> (f64, f64) {
        match self {
            ElementType::UInt8 => (0.0, u8::MAX as f64),
            ElementType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            ElementType::UInt16 => (0.0, u16::MAX as f64),
            ElementType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            ElementType::UInt32 => (0.0, u32::MAX as f64),
            ElementType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            ElementType::UInt64 => (0.0, u64::MAX as f64),
            ElementType::Int64 => (i64::MIN as f64, i64::MAX as f64),
            ElementType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            ElementType::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Default sentinel for the type: the maximum for unsigned integers,
    /// the minimum for signed integers and floats.
    pub fn edge_value(self) -> f64 {
        let (lo, hi) = self.range();
        if self.is_unsigned() { hi } else { lo }
    }

    /// Next wider type of the same family. The widest types return themselves.
    pub fn widen(self) -> ElementType {
        match self {
            ElementType::UInt8 => ElementType::UInt16,
            ElementType::Int8 => ElementType::Int16,
            ElementType::UInt16 => ElementType::UInt32,
            ElementType::Int16 => ElementType::Int32,
            ElementType::UInt32 => ElementType::UInt64,
            ElementType::Int32 => ElementType::Int64,
            ElementType::Float32 => ElementType::Float64,
            other => other,
        }
    }

    pub fn contains_range(self, min: f64, max: f64) -> bool {
        let (lo, hi) = self.range();
        lo <= min && max <= hi
    }

    /// Whether `value` survives a cast to this type unchanged.
    pub fn can_represent(self, value: f64) -> bool {
        match self {
            ElementType::Float64 => true,
            ElementType::Float32 => value.is_nan() || (value as f32) as f64 == value,
            _ => {
                let (lo, hi) = self.range();
                value.is_finite() && value.fract() == 0.0 && lo <= value && value <= hi
            }
        }
    }

    /// Rounds `value` to what the type can hold. Callers guarantee the value is in range.
    #[inline]
    pub fn cast(self, value: f64) -> f64 {
        match self {
            ElementType::Float64 => value,
            ElementType::Float32 => (value as f32) as f64,
            _ => value.round(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::UInt8 => "uint8",
            ElementType::Int8 => "int8",
            ElementType::UInt16 => "uint16",
            ElementType::Int16 => "int16",
            ElementType::UInt32 => "uint32",
            ElementType::Int32 => "int32",
            ElementType::UInt64 => "uint64",
            ElementType::Int64 => "int64",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_values() {
        assert_eq!(ElementType::UInt8.edge_value(), 255.0);
        assert_eq!(ElementType::Int16.edge_value(), -32768.0);
        assert_eq!(ElementType::Float32.edge_value(), f32::MIN as f64);
    }

    #[test]
    fn test_widen_stops_at_widest() {
        assert_eq!(ElementType::UInt8.widen(), ElementType::UInt16);
        assert_eq!(ElementType::Int64.widen(), ElementType::Int64);
        assert_eq!(ElementType::Float64.widen(), ElementType::Float64);
    }

    #[test]
    fn test_can_represent() {
        assert!(ElementType::UInt8.can_represent(255.0));
        assert!(!ElementType::UInt8.can_represent(256.0));
        assert!(!ElementType::Int16.can_represent(1.5));
        assert!(ElementType::Float32.can_represent(0.5));
        assert!(!ElementType::Float32.can_represent(0.1));
    }

    #[test]
    fn test_serde_names() {
        let parsed: ElementType = serde_json::from_str("\"float32\"").unwrap();
        assert_eq!(parsed, ElementType::Float32);
        assert_eq!(serde_json::to_string(&ElementType::UInt16).unwrap(), "\"uint16\"");
    }
}
