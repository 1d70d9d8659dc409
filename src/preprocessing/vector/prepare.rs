use geo::{Coord, CoordsIter, MapCoords};
use tracing::debug;

use crate::preprocessing::common::error::{ProcessingError, Result};
use crate::preprocessing::grid::{CrsTransformer, GridMetadata};
use crate::preprocessing::vector::query::FeatureQuery;
use crate::preprocessing::vector::types::{Feature, VectorLayer};

/// Brings a vector layer into the template's CRS, keeping only features that pass `query`.
///
/// Nothing is snapped to the template grid here. Fails with a `DataError` when the layer
/// is empty or the query leaves no features, and with a `ConfigError` when the query
/// references a column the layer does not have.
pub fn prepare_vector_layer(
    layer: &VectorLayer,
    template: &GridMetadata,
    query: Option<&FeatureQuery>,
) -> Result<VectorLayer> {
    if layer.is_empty() {
        return Err(ProcessingError::data(format!("vector layer '{}' is empty", layer.name)));
    }

    let selected: Vec<(usize, &Feature)> = match query {
        Some(query) => {
            if let Some(column) = query.columns().find(|column| !layer.has_column(column)) {
                return Err(ProcessingError::config(format!(
                    "query references unknown column '{column}' in layer '{}'",
                    layer.name
                )));
            }
            let kept: Vec<_> = layer
                .features
                .iter()
                .enumerate()
                .filter(|(_, feature)| query.matches(feature))
                .collect();
            if kept.is_empty() {
                return Err(ProcessingError::data(format!(
                    "query '{query}' selected no features from layer '{}'",
                    layer.name
                )));
            }
            kept
        }
        None => layer.features.iter().enumerate().collect(),
    };
    debug!(total = layer.len(), selected = selected.len(), "Filtered vector features");

    let transformer = CrsTransformer::between(layer.crs.as_ref(), template.crs.as_ref())?;

    let features = selected
        .into_iter()
        .map(|(index, feature)| reproject_feature(index, feature, &transformer))
        .collect::<Result<Vec<_>>>()?;

    Ok(VectorLayer {
        name: layer.name.clone(),
        crs: template.crs.clone().or_else(|| layer.crs.clone()),
        features,
    })
}

fn reproject_feature(
    index: usize,
    feature: &Feature,
    transformer: &CrsTransformer,
) -> Result<Feature> {
    let Some(geometry) = &feature.geometry else {
        return Ok(feature.clone());
    };
    let label = || feature.label(index);

    let geometry = if transformer.is_identity() {
        geometry.clone()
    } else {
        geometry
            .try_map_coords(|coord| {
                transformer
                    .transform(coord.x, coord.y)
                    .map(|(x, y)| Coord { x, y })
            })
            .map_err(|e| ProcessingError::geometry(label(), format!("reprojection failed: {e}")))?
    };

    if geometry
        .coords_iter()
        .any(|coord| !coord.x.is_finite() || !coord.y.is_finite())
    {
        return Err(ProcessingError::geometry(label(), "geometry has non-finite coordinates"));
    }

    Ok(Feature {
        id: feature.id.clone(),
        geometry: Some(geometry),
        attributes: feature.attributes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::grid::{Crs, GeoTransform};
    use crate::preprocessing::vector::types::AttributeValue;
    use geo::{point, Geometry};

    fn template(crs: Option<Crs>) -> GridMetadata {
        GridMetadata::new(GeoTransform::from_origin(0.0, 10.0, 1.0, 1.0), crs, 10, 10)
    }

    fn layer(crs: Option<Crs>) -> VectorLayer {
        let features = vec![
            Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0))).with_attribute("kind", "a"),
            Feature::new(Geometry::Point(point!(x: 1.0, y: 1.0))).with_attribute("kind", "b"),
        ];
        VectorLayer::new("points", crs, features)
    }

    #[test]
    fn test_query_filters_features() {
        let query: FeatureQuery = "kind == 'b'".parse().unwrap();
        let (points, grid) = (layer(Some(Crs::WGS84)), template(Some(Crs::WGS84)));
        let out = prepare_vector_layer(&points, &grid, Some(&query)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.features[0].attribute("kind"), &AttributeValue::from("b"));
    }

    #[test]
    fn test_empty_results_are_data_errors() {
        let empty = VectorLayer::new("empty", Some(Crs::WGS84), vec![]);
        assert!(matches!(
            prepare_vector_layer(&empty, &template(Some(Crs::WGS84)), None),
            Err(ProcessingError::Data(_))
        ));
        let query: FeatureQuery = "kind == 'z'".parse().unwrap();
        let points = layer(Some(Crs::WGS84));
        assert!(matches!(
            prepare_vector_layer(&points, &template(Some(Crs::WGS84)), Some(&query)),
            Err(ProcessingError::Data(_))
        ));
    }

    #[test]
    fn test_unknown_query_column_is_config_error() {
        let query: FeatureQuery = "depth > 3".parse().unwrap();
        let points = layer(Some(Crs::WGS84));
        assert!(matches!(
            prepare_vector_layer(&points, &template(Some(Crs::WGS84)), Some(&query)),
            Err(ProcessingError::Config(_))
        ));
    }

    #[test]
    fn test_reprojects_into_template_crs() {
        let points = layer(Some(Crs::WGS84));
        let out = prepare_vector_layer(&points, &template(Some(Crs::Epsg(3857))), None).unwrap();
        assert_eq!(out.crs, Some(Crs::Epsg(3857)));
        let Some(Geometry::Point(p)) = &out.features[1].geometry else {
            panic!("expected a point");
        };
        assert!((p.x() - 111_319.490_793).abs() < 1e-2);
        assert!(p.y() > 110_000.0 && p.y() < 112_000.0);
    }
}
