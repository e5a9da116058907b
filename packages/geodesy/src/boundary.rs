//! County boundary polygon.
//!
//! Loaded from a `GeoJSON` file (a bare geometry, a feature, or a feature
//! collection whose polygon features are merged). Used by the AQI stage to
//! derive the county centroid for the bounding-box fallback and to drop
//! sensors that fall outside the county.

use std::path::Path;

use geo::{BoundingRect, Centroid, Contains, MultiPolygon, Point, Rect};
use geojson::GeoJson;

use crate::GeodesyError;

/// A county polygon in EPSG:4326.
#[derive(Debug, Clone)]
pub struct CountyBoundary {
    polygon: MultiPolygon<f64>,
    envelope: Rect<f64>,
}

impl CountyBoundary {
    /// Reads and parses a `GeoJSON` boundary file.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesyError`] if the file cannot be read or holds no
    /// polygon geometry.
    pub fn load(path: &Path) -> Result<Self, GeodesyError> {
        let contents = std::fs::read_to_string(path)?;
        let boundary = Self::from_geojson_str(&contents)?;
        log::info!(
            "Loaded county boundary from {} ({} polygon(s))",
            path.display(),
            boundary.polygon.0.len()
        );
        Ok(boundary)
    }

    /// Parses a boundary from a `GeoJSON` string.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesyError::Boundary`] if the string is not `GeoJSON`
    /// or contains no `Polygon`/`MultiPolygon` geometry.
    pub fn from_geojson_str(geojson_str: &str) -> Result<Self, GeodesyError> {
        let geojson: GeoJson = geojson_str.parse().map_err(|e| GeodesyError::Boundary {
            message: format!("invalid GeoJSON: {e}"),
        })?;

        let geometries = match geojson {
            GeoJson::Geometry(geom) => vec![geom],
            GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
            GeoJson::FeatureCollection(collection) => collection
                .features
                .into_iter()
                .filter_map(|feature| feature.geometry)
                .collect(),
        };

        let mut polygons = Vec::new();
        for geom in geometries {
            if let Some(mp) = geometry_to_multipolygon(geom) {
                polygons.extend(mp.0);
            }
        }

        let polygon = MultiPolygon(polygons);
        let envelope = polygon
            .bounding_rect()
            .ok_or_else(|| GeodesyError::Boundary {
                message: "no Polygon or MultiPolygon geometry found".to_string(),
            })?;

        Ok(Self { polygon, envelope })
    }

    /// The polygon's centroid (longitude/latitude).
    #[must_use]
    pub fn centroid(&self) -> Option<Point> {
        self.polygon.centroid()
    }

    /// Returns `true` if the point lies inside the county.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let point = Point::new(lon, lat);
        self.envelope.contains(&point) && self.polygon.contains(&point)
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn geometry_to_multipolygon(geom: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}
