#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Yearly AQI aggregation for a county.
//!
//! An [`AqiSource`] supplies per-sensor daily readings for a county or a
//! bounding box. [`aggregate::aggregate_years`] walks a year range,
//! falls back to growing boxes around the county centroid when the county
//! itself has too few sensors, and averages what it finds per year.
//! [`AqsClient`] is the EPA AQS implementation.

pub mod aggregate;
pub mod client;
pub mod retry;

pub use aggregate::{
    AqiOutcome, CoverageSource, FallbackPolicy, YearCoverage, aggregate_years, distinct_sensors,
    mean_by_year, needs_fallback,
};
pub use client::AqsClient;

use async_trait::async_trait;
use smoke_aqi_models::{BoundingBox, CountyFips, ModelError, SensorReading};
use smoke_batch::BatchError;
use smoke_geodesy::GeodesyError;

/// Errors that can occur while fetching or aggregating AQI data.
#[derive(Debug, thiserror::Error)]
pub enum AqiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with an error status.
    #[error("HTTP {status} from {path}")]
    Status {
        /// Response status code.
        status: u16,
        /// Request path (query omitted, it carries credentials).
        path: String,
    },

    /// The AQS envelope reported a failure.
    #[error("AQS API error: {message}")]
    Api {
        /// Status and error text from the response header.
        message: String,
    },

    /// Invalid county code or season window.
    #[error("Invalid settings: {0}")]
    Settings(#[from] ModelError),

    /// The county boundary could not be loaded.
    #[error("Geodesy error: {0}")]
    Geodesy(#[from] GeodesyError),

    /// Writing the stage output failed.
    #[error("Output error: {0}")]
    Batch(#[from] BatchError),

    /// No AQS email/key were configured.
    #[error("AQS credentials missing: set aqi.email and aqi.key or AQS_EMAIL and AQS_KEY")]
    MissingCredentials,
}

/// A provider of per-sensor daily AQI readings.
#[async_trait]
pub trait AqiSource: Send + Sync {
    /// Readings from every sensor in `county` during `year`'s window.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError`] if the readings cannot be fetched.
    async fn readings_by_county(
        &self,
        year: i32,
        county: &CountyFips,
    ) -> Result<Vec<SensorReading>, AqiError>;

    /// Readings from every sensor inside `bbox` during `year`'s window.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError`] if the readings cannot be fetched.
    async fn readings_by_box(
        &self,
        year: i32,
        bbox: &BoundingBox,
    ) -> Result<Vec<SensorReading>, AqiError>;
}
