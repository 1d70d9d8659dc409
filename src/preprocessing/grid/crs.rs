//! Coordinate reference systems and coordinate transformation between them.

use std::fmt;
use std::str::FromStr;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

use crate::preprocessing::common::error::{ProcessingError, Result};

/// A coordinate reference system identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    Epsg(u32),
    Esri(u32),
    /// Free-form PROJ definition, e.g. `+proj=utm +zone=17 +datum=WGS84`.
    Proj(String),
}

impl Crs {
    pub const WGS84: Crs = Crs::Epsg(4326);

    /// PROJ definition for the CRS, if it is one this crate knows.
    pub fn proj_string(&self) -> Option<String> {
        match self {
            Crs::Proj(definition) => Some(definition.clone()),
            Crs::Epsg(4326) => Some("+proj=longlat +datum=WGS84 +no_defs".to_string()),
            Crs::Epsg(4269) => Some("+proj=longlat +datum=NAD83 +no_defs".to_string()),
            Crs::Epsg(3857) => Some(
                concat!(
                    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0",
                    " +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
                )
                .to_string(),
            ),
            Crs::Epsg(5070) => Some(
                concat!(
                    "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5",
                    " +x_0=0 +y_0=0 +datum=NAD83 +units=m +no_defs"
                )
                .to_string(),
            ),
            Crs::Esri(102008) => Some(
                concat!(
                    "+proj=aea +lat_0=40 +lon_0=-96 +lat_1=20 +lat_2=60",
                    " +x_0=0 +y_0=0 +datum=NAD83 +units=m +no_defs"
                )
                .to_string(),
            ),
            Crs::Epsg(code @ 32601..=32660) => Some(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                code - 32600
            )),
            Crs::Epsg(code @ 32701..=32760) => Some(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                code - 32700
            )),
            _ => None,
        }
    }

    /// True when coordinates are longitude/latitude in degrees.
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Epsg(4326) | Crs::Epsg(4269) => true,
            Crs::Proj(definition) => {
                definition.contains("+proj=longlat") || definition.contains("+proj=latlong")
            }
            _ => false,
        }
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Esri(code) => write!(f, "ESRI:{code}"),
            Crs::Proj(definition) => f.write_str(definition),
        }
    }
}

impl FromStr for Crs {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with('+') {
            return Ok(Crs::Proj(trimmed.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(Crs::WGS84);
        }

        // "EPSG:4326", "ESRI:102008", "urn:ogc:def:crs:EPSG::3857"
        let code = upper
            .rsplit(':')
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .ok_or_else(|| ProcessingError::config(format!("unrecognised CRS '{trimmed}'")))?;

        if upper.contains("ESRI") {
            Ok(Crs::Esri(code))
        } else if upper.contains("EPSG") {
            Ok(Crs::Epsg(code))
        } else {
            Err(ProcessingError::config(format!("unrecognised CRS authority in '{trimmed}'")))
        }
    }
}

impl TryFrom<String> for Crs {
    type Error = ProcessingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// Transforms coordinates from one CRS to another.
pub enum CrsTransformer {
    Identity,
    Proj {
        source: Box<Proj>,
        target: Box<Proj>,
        source_geographic: bool,
        target_geographic: bool,
    },
}

impl fmt::Debug for CrsTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsTransformer::Identity => f.write_str("CrsTransformer::Identity"),
            CrsTransformer::Proj {
                source_geographic,
                target_geographic,
                ..
            } => f
                .debug_struct("CrsTransformer::Proj")
                .field("source_geographic", source_geographic)
                .field("target_geographic", target_geographic)
                .finish_non_exhaustive(),
        }
    }
}

impl CrsTransformer {
    pub fn new(source: &Crs, target: &Crs) -> Result<Self> {
        if source == target {
            return Ok(CrsTransformer::Identity);
        }

        let source_proj = Self::build_proj(source)?;
        let target_proj = Self::build_proj(target)?;

        Ok(CrsTransformer::Proj {
            source: Box::new(source_proj),
            target: Box::new(target_proj),
            source_geographic: source.is_geographic(),
            target_geographic: target.is_geographic(),
        })
    }

    /// Builds a transformer when at most one side may be unknown.
    ///
    /// A missing CRS on one side is taken to equal the other; missing on both sides is an error.
    pub fn between(source: Option<&Crs>, target: Option<&Crs>) -> Result<Self> {
        match (source, target) {
            (Some(source), Some(target)) => Self::new(source, target),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("one side has no CRS; assuming both share the same CRS");
                Ok(CrsTransformer::Identity)
            }
            (None, None) => Err(ProcessingError::config(
                "neither layer declares a coordinate reference system",
            )),
        }
    }

    fn build_proj(crs: &Crs) -> Result<Proj> {
        let definition = crs
            .proj_string()
            .ok_or_else(|| ProcessingError::config(format!("{crs} is not supported")))?;
        Proj::from_proj_string(&definition)
            .map_err(|e| ProcessingError::config(format!("invalid projection {crs}: {e:?}")))
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, CrsTransformer::Identity)
    }

    #[inline]
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match self {
            CrsTransformer::Identity => Ok((x, y)),
            CrsTransformer::Proj {
                source,
                target,
                source_geographic,
                target_geographic,
            } => {
                let mut point = if *source_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };

                transform(source, target, &mut point).map_err(|e| {
                    ProcessingError::data(format!("coordinate transform failed: {e:?}"))
                })?;

                if *target_geographic {
                    Ok((point.0.to_degrees(), point.1.to_degrees()))
                } else {
                    Ok((point.0, point.1))
                }
            }
        }
    }
}
