#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wildfire perimeter processing.
//!
//! Streams the USGS combined wildland fire export (or any JSON array of
//! flat fire records), reduces each fire's perimeter to the vertex closest
//! to the reference point, and builds small named-fire extracts of the
//! full dataset for testing and exploration.

pub mod extract;
pub mod reader;
pub mod record;
pub mod reduce;

pub use reader::{Document, Header, Layout, header_crs, inspect, read_features};
pub use reduce::{PerimeterReducer, ReductionOutcome, reduce_file};

use smoke_batch::BatchError;
use smoke_geodesy::GeodesyError;
use thiserror::Error;

/// Errors that stop a whole fire stage.
#[derive(Debug, Error)]
pub enum FireError {
    /// I/O error (opening the input, writing an extract).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input is not valid JSON or has the wrong top-level shape.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input declares a CRS this crate cannot read.
    #[error("Geodesy error: {0}")]
    Geodesy(#[from] GeodesyError),

    /// Writing the stage output failed.
    #[error("Output error: {0}")]
    Batch(#[from] BatchError),

    /// An `extract` target could not be parsed.
    #[error("Invalid fire target: {message}")]
    InvalidTarget {
        /// Description of what went wrong.
        message: String,
    },
}

/// Errors that cause a single fire record to be skipped.
#[derive(Debug, Error)]
pub enum FireDataError {
    /// The record's attributes or perimeter could not be parsed.
    #[error("Malformed record: {message}")]
    MalformedRecord {
        /// Description of what went wrong.
        message: String,
    },

    /// A perimeter vertex could not be transformed into EPSG:4326.
    #[error(transparent)]
    GeoProjection(#[from] GeodesyError),
}

impl FireDataError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }
}
