#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wildfire record types.
//!
//! A [`FireRecord`] is one fire as it appears in the USGS combined
//! wildland fire dataset: its attributes plus perimeter rings in the
//! input CRS. The reducer turns each one into a [`ReducedFireRecord`],
//! which is exactly one row of `wf_data.csv`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smoke_geodesy::{Crs, Point};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// A perimeter ring: `[x, y]` vertices (longitude/latitude in EPSG:4326,
/// easting/northing in projected CRSs).
pub type Ring = Vec<[f64; 2]>;

/// The USGS `Assigned_Fire_Type` classification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(into = "&'static str", from = "String")]
#[strum(ascii_case_insensitive)]
pub enum FireType {
    /// Confirmed wildfire.
    #[strum(to_string = "Wildfire")]
    Wildfire,
    /// Unconfirmed, but most likely a wildfire.
    #[strum(to_string = "Unknown - Likely Wildfire", serialize = "Likely Wildfire")]
    LikelyWildfire,
    /// Confirmed prescribed burn.
    #[strum(to_string = "Prescribed Fire")]
    PrescribedFire,
    /// Unconfirmed, but most likely a prescribed burn.
    #[strum(
        to_string = "Unknown - Likely Prescribed Fire",
        serialize = "Likely Prescribed Fire"
    )]
    LikelyPrescribedFire,
    /// Missing or unrecognized classification.
    #[strum(to_string = "Unknown")]
    Unknown,
}

impl FireType {
    /// Maps a USGS label to a [`FireType`], falling back to
    /// [`FireType::Unknown`] for anything unrecognized.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        label.trim().parse().unwrap_or(Self::Unknown)
    }

    /// Returns `true` for confirmed and likely wildfires.
    #[must_use]
    pub const fn is_wildfire(self) -> bool {
        matches!(self, Self::Wildfire | Self::LikelyWildfire)
    }
}

impl From<String> for FireType {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

/// One wildfire as loaded from the input dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FireRecord {
    /// `Fire_Year`.
    pub year: i32,
    /// `USGS_Assigned_ID`.
    pub id: String,
    /// `Listed_Fire_Names` (may list several comma-separated names).
    pub name: String,
    /// `GIS_Acres`.
    pub size_acres: f64,
    /// `Assigned_Fire_Type`.
    pub fire_type: FireType,
    /// Perimeter rings in the input CRS.
    pub rings: Vec<Ring>,
}

impl FireRecord {
    /// Total number of vertices across all rings.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.rings.iter().map(Vec::len).sum()
    }
}

/// One row of `wf_data.csv`.
///
/// Field order and serialized names define the CSV columns: `year, id,
/// name, size, type, close_lat, close_lon, distance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedFireRecord {
    /// Fire year.
    pub year: i32,
    /// USGS id.
    pub id: String,
    /// Listed fire name(s).
    pub name: String,
    /// Burned area in acres.
    #[serde(rename = "size")]
    pub size_acres: f64,
    /// Fire classification.
    #[serde(rename = "type")]
    pub fire_type: FireType,
    /// Latitude of the perimeter vertex closest to the reference point.
    #[serde(rename = "close_lat")]
    pub closest_lat: f64,
    /// Longitude of the perimeter vertex closest to the reference point.
    #[serde(rename = "close_lon")]
    pub closest_lon: f64,
    /// Geodesic distance from that vertex to the reference point, in miles.
    #[serde(rename = "distance")]
    pub distance_miles: f64,
}

impl ReducedFireRecord {
    /// Header of `wf_data.csv`, matching the serialized field names.
    pub const CSV_COLUMNS: &'static [&'static str] = &[
        "year",
        "id",
        "name",
        "size",
        "type",
        "close_lat",
        "close_lon",
        "distance",
    ];
}

/// The fixed point distances are measured from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferencePoint {
    /// Display name (e.g. `"Kingman, AZ"`).
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl ReferencePoint {
    /// The reference as a longitude/latitude point.
    #[must_use]
    pub fn point(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

impl Default for ReferencePoint {
    fn default() -> Self {
        Self {
            name: "Kingman, AZ".to_string(),
            lat: 35.1894,
            lon: -114.0530,
        }
    }
}

/// Settings for the fire reduction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireSettings {
    /// Input dataset: a JSON array of flat records or an Esri-JSON
    /// `FeatureSet` export.
    pub input: PathBuf,
    /// CRS assumed when the input does not declare a `spatialReference`.
    pub input_crs: Crs,
    /// Destination CSV.
    pub output: PathBuf,
}

impl Default for FireSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/USGS_Wildland_Fire_Combined_Dataset.json"),
            input_crs: Crs::Wgs84,
            output: PathBuf::from("wf_data.csv"),
        }
    }
}
