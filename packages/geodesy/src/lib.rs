#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geodesy for the smoke study.
//!
//! Everything the pipeline needs to put fire perimeters and air-quality
//! sensors on the same map:
//!
//! * [`crs`]: the coordinate reference systems found in the USGS wildfire
//!   exports and their inverse projections back to EPSG:4326.
//! * [`distance`]: WGS84 geodesic distance in miles and the nearest-vertex
//!   reduction over a perimeter.
//! * [`boundary`]: a county polygon loaded from `GeoJSON` for centroid and
//!   point-in-polygon checks.

pub mod boundary;
pub mod crs;
pub mod distance;

pub use boundary::CountyBoundary;
pub use crs::Crs;
pub use distance::{METERS_PER_MILE, NearestVertex, distance_miles, nearest_vertex};
pub use geo::Point;

use thiserror::Error;

/// Errors that can occur during geodesy operations.
#[derive(Debug, Error)]
pub enum GeodesyError {
    /// A coordinate could not be transformed into EPSG:4326.
    #[error("Projection error ({crs}) at ({x}, {y}): {reason}")]
    Projection {
        /// Source CRS of the coordinate.
        crs: Crs,
        /// Easting / longitude as given.
        x: f64,
        /// Northing / latitude as given.
        y: f64,
        /// What went wrong.
        reason: String,
    },

    /// The CRS code or Esri well-known id is not supported.
    #[error("Unsupported coordinate reference system: {code}")]
    UnsupportedCrs {
        /// The code as given (e.g. `"EPSG:2163"` or `"wkid 102003"`).
        code: String,
    },

    /// A boundary file could not be turned into a polygon.
    #[error("Boundary error: {message}")]
    Boundary {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error (reading a boundary file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
