#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Air quality types.
//!
//! Sensor readings as returned by the EPA AQS daily data service, the
//! yearly aggregate written to `aqi_data.csv`, and the settings that drive
//! the AQI stage.

use std::fmt;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// AQS parameter codes requested by default: CO, SO2, NO2, ozone, PM10,
/// PM2.5 (FRM and non-FRM).
pub const DEFAULT_PARAMETERS: &[&str] = &["42101", "42401", "42602", "44201", "81102", "88101", "88502"];

/// An invalid FIPS code or season date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A FIPS code of the wrong width or with non-digit characters.
    #[error("invalid {kind} FIPS code {code:?}: expected {width} digits")]
    Fips {
        /// `"state"` or `"county"`.
        kind: &'static str,
        /// The code as given.
        code: String,
        /// Required number of digits.
        width: usize,
    },

    /// A season boundary that is not a valid `MMDD` date.
    #[error("invalid season date {0:?}: expected MMDD")]
    SeasonDate(String),
}

/// A county identified by its state and county FIPS codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountyFips {
    state: String,
    county: String,
}

impl CountyFips {
    /// Validates and builds a county code, e.g. `("04", "015")` for
    /// Mohave County, AZ.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Fips`] unless `state` is 2 digits and
    /// `county` is 3 digits.
    pub fn new(state: &str, county: &str) -> Result<Self, ModelError> {
        Ok(Self {
            state: digits("state", state, 2)?,
            county: digits("county", county, 3)?,
        })
    }

    /// Two-digit state code.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Three-digit county code.
    #[must_use]
    pub fn county(&self) -> &str {
        &self.county
    }
}

impl fmt::Display for CountyFips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.state, self.county)
    }
}

fn digits(kind: &'static str, code: &str, width: usize) -> Result<String, ModelError> {
    let code = code.trim();
    if code.len() == width && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(code.to_string())
    } else {
        Err(ModelError::Fips {
            kind,
            code: code.to_string(),
            width,
        })
    }
}

/// A latitude/longitude rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

impl BoundingBox {
    /// A box extending `half_width_deg` in every direction from
    /// `(lat, lon)`, clamped to valid coordinates.
    #[must_use]
    pub fn around(lat: f64, lon: f64, half_width_deg: f64) -> Self {
        Self {
            min_lat: (lat - half_width_deg).max(-90.0),
            max_lat: (lat + half_width_deg).min(90.0),
            min_lon: (lon - half_width_deg).max(-180.0),
            max_lon: (lon + half_width_deg).min(180.0),
        }
    }

    /// Returns `true` if the point lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}..{:.3} lat, {:.3}..{:.3} lon]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}

/// A monitor: one parameter measured by one instrument (POC) at one site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId {
    /// State FIPS code.
    pub state_code: String,
    /// County FIPS code.
    pub county_code: String,
    /// AQS site number.
    pub site_number: String,
    /// AQS parameter code.
    pub parameter_code: String,
    /// Parameter occurrence code.
    pub poc: u32,
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.state_code, self.county_code, self.site_number, self.parameter_code, self.poc
        )
    }
}

/// One daily reading from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// The reporting monitor.
    pub sensor: SensorId,
    /// Local date of the reading.
    pub date: NaiveDate,
    /// Site latitude.
    pub latitude: f64,
    /// Site longitude.
    pub longitude: f64,
    /// Daily AQI, when the parameter has one.
    pub aqi: Option<f64>,
}

impl SensorReading {
    /// Calendar year of the reading.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

/// One row of `aqi_data.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AqiYearRecord {
    /// Calendar year.
    pub year: i32,
    /// Mean AQI over every reading of every matched sensor.
    #[serde(rename = "aqi")]
    pub mean_aqi: f64,
}

impl AqiYearRecord {
    /// Header of `aqi_data.csv`, matching the serialized field names.
    pub const CSV_COLUMNS: &'static [&'static str] = &["year", "aqi"];
}

/// Settings for the AQI stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AqiSettings {
    /// AQS API root.
    pub base_url: String,
    /// Registered AQS account email.
    pub email: String,
    /// AQS account key.
    pub key: String,
    /// Two-digit state FIPS code.
    pub state_fips: String,
    /// Three-digit county FIPS code.
    pub county_fips: String,
    /// County centroid latitude (bounding-box fallback origin).
    pub centroid_lat: f64,
    /// County centroid longitude.
    pub centroid_lon: f64,
    /// Optional county polygon (`GeoJSON`). When set its centroid replaces
    /// `centroid_lat`/`centroid_lon` and county readings from sensors
    /// outside it are dropped.
    pub county_boundary: Option<PathBuf>,
    /// First year, inclusive.
    pub start_year: i32,
    /// Last year, inclusive.
    pub end_year: i32,
    /// AQS parameter codes.
    pub parameters: Vec<String>,
    /// First day of the window each year, `MMDD`.
    pub season_start: String,
    /// Last day of the window each year, `MMDD`.
    pub season_end: String,
    /// Fewest distinct sensors a query must find to be used as is.
    pub min_sensors: usize,
    /// Half-width of the first fallback box, in degrees.
    pub initial_half_width_deg: f64,
    /// Growth of the half-width per fallback step, in degrees.
    pub expansion_step_deg: f64,
    /// Number of fallback boxes to try.
    pub max_expansions: u32,
    /// Retries per request after the first attempt.
    pub max_retries: u32,
    /// Backoff base; attempt `n` waits `base * 2^n`.
    pub retry_base_delay_ms: u64,
    /// Pause between consecutive requests.
    pub request_delay_ms: u64,
    /// HTTP client timeout.
    pub timeout_secs: u64,
    /// Destination CSV.
    pub output: PathBuf,
}

impl AqiSettings {
    /// The configured county as a validated [`CountyFips`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Fips`] for malformed codes.
    pub fn county(&self) -> Result<CountyFips, ModelError> {
        CountyFips::new(&self.state_fips, &self.county_fips)
    }
}

/// Formats `MMDD` in `year` as `YYYYMMDD`, validating the date.
///
/// # Errors
///
/// Returns [`ModelError::SeasonDate`] if the result is not a real date.
pub fn season_date(year: i32, mmdd: &str) -> Result<String, ModelError> {
    let invalid = || ModelError::SeasonDate(mmdd.to_string());
    if mmdd.len() != 4 || !mmdd.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let date = NaiveDate::parse_from_str(&format!("{year:04}{mmdd}"), "%Y%m%d").map_err(|_| invalid())?;
    Ok(date.format("%Y%m%d").to_string())
}

impl Default for AqiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://aqs.epa.gov/data/api".to_string(),
            email: String::new(),
            key: String::new(),
            state_fips: "04".to_string(),
            county_fips: "015".to_string(),
            centroid_lat: 35.7047,
            centroid_lon: -113.7577,
            county_boundary: None,
            start_year: 1963,
            end_year: 2023,
            parameters: DEFAULT_PARAMETERS.iter().map(ToString::to_string).collect(),
            season_start: "0501".to_string(),
            season_end: "1031".to_string(),
            min_sensors: 3,
            initial_half_width_deg: 0.5,
            expansion_step_deg: 0.5,
            max_expansions: 4,
            max_retries: 4,
            retry_base_delay_ms: 1_000,
            request_delay_ms: 5_000,
            timeout_secs: 60,
            output: PathBuf::from("aqi_data.csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fips_validation() {
        let mohave = CountyFips::new("04", "015").unwrap();
        assert_eq!(mohave.to_string(), "04015");
        assert_eq!(mohave.state(), "04");
        assert_eq!(mohave.county(), "015");

        assert!(CountyFips::new("4", "015").is_err());
        assert!(CountyFips::new("04", "15").is_err());
        assert!(matches!(
            CountyFips::new("AZ", "015"),
            Err(ModelError::Fips { kind: "state", .. })
        ));
    }

    #[test]
    fn bounding_box_is_clamped() {
        let bbox = BoundingBox::around(89.5, 179.0, 2.0);
        assert!((bbox.max_lat - 90.0).abs() < f64::EPSILON);
        assert!((bbox.min_lat - 87.5).abs() < 1e-12);
        assert!((bbox.max_lon - 180.0).abs() < f64::EPSILON);
        assert!(bbox.contains(88.0, 179.5));
        assert!(!bbox.contains(86.0, 179.5));
    }

    #[test]
    fn season_dates_format_for_aqs() {
        let settings = AqiSettings::default();
        assert_eq!(season_date(2020, &settings.season_start).unwrap(), "20200501");
        assert_eq!(season_date(2020, &settings.season_end).unwrap(), "20201031");

        assert!(season_date(2020, "0229").is_ok());
        assert!(season_date(2021, "0229").is_err());
        assert!(season_date(2021, "1301").is_err());
        assert!(season_date(2021, "501").is_err());
    }

    #[test]
    fn sensor_identity() {
        let sensor = SensorId {
            state_code: "04".to_string(),
            county_code: "015".to_string(),
            site_number: "1003".to_string(),
            parameter_code: "88101".to_string(),
            poc: 1,
        };
        assert_eq!(sensor.to_string(), "04-015-1003-88101-1");

        let reading = SensorReading {
            sensor,
            date: NaiveDate::from_ymd_opt(2019, 7, 4).unwrap(),
            latitude: 35.2,
            longitude: -114.0,
            aqi: Some(42.0),
        };
        assert_eq!(reading.year(), 2019);
    }

    #[test]
    fn settings_defaults_fill_missing_fields() {
        let settings: AqiSettings = toml::from_str("start_year = 2000\nmin_sensors = 1").unwrap();
        assert_eq!(settings.start_year, 2000);
        assert_eq!(settings.min_sensors, 1);
        assert_eq!(settings.end_year, 2023);
        assert_eq!(settings.parameters.len(), DEFAULT_PARAMETERS.len());
        assert_eq!(settings.county().unwrap().to_string(), "04015");
    }
}
