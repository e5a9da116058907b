//! Geodesic distance and the nearest-vertex reduction.
//!
//! Distances are measured on the WGS84 ellipsoid (Karney's geodesic
//! algorithm via [`geo::Geodesic`]) and reported in statute miles.

use std::convert::Infallible;

use geo::{Distance, Geodesic, Point};

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1_609.344;

/// Geodesic distance between two EPSG:4326 points, in miles.
#[must_use]
pub fn distance_miles(a: Point, b: Point) -> f64 {
    Geodesic.distance(a, b) / METERS_PER_MILE
}

/// The perimeter vertex closest to a reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestVertex {
    /// The vertex (longitude/latitude).
    pub point: Point,
    /// Geodesic distance from the reference point, in miles.
    pub distance_miles: f64,
}

/// Finds the vertex closest to `reference`.
///
/// Returns `None` when `vertices` is empty. When several vertices share
/// the minimum distance the first one encountered is reported.
#[must_use]
pub fn nearest_vertex<I>(reference: Point, vertices: I) -> Option<NearestVertex>
where
    I: IntoIterator<Item = Point>,
{
    match try_nearest_vertex(reference, vertices.into_iter().map(Ok::<_, Infallible>)) {
        Ok(nearest) => nearest,
        Err(never) => match never {},
    }
}

/// Like [`nearest_vertex`] but over fallible vertices, so callers can
/// reproject lazily and stop at the first vertex that fails.
///
/// # Errors
///
/// Returns the first error yielded by `vertices`.
pub fn try_nearest_vertex<I, E>(reference: Point, vertices: I) -> Result<Option<NearestVertex>, E>
where
    I: IntoIterator<Item = Result<Point, E>>,
{
    let mut best: Option<NearestVertex> = None;

    for vertex in vertices {
        let point = vertex?;
        let distance = distance_miles(reference, point);
        match best {
            Some(current) if distance >= current.distance_miles => {}
            _ => {
                best = Some(NearestVertex {
                    point,
                    distance_miles: distance,
                });
            }
        }
    }

    Ok(best)
}
