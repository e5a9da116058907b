//! `smoke.toml` configuration.
//!
//! Every section is optional; the built-in defaults reproduce the Kingman,
//! AZ study (Mohave County, fire season May through October). AQS
//! credentials are usually supplied through `AQS_EMAIL`/`AQS_KEY` rather
//! than the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smoke_aqi_models::{AqiSettings, season_date};
use smoke_fire_models::{FireSettings, ReferencePoint};

/// Config file read when neither `--config` nor `SMOKE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "smoke.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SMOKE_CONFIG";

const EMAIL_ENV: &str = "AQS_EMAIL";
const KEY_ENV: &str = "AQS_KEY";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`SmokeConfig`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration could not be rendered.
    #[error("TOML render error: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is out of range or inconsistent.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// The whole `smoke.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmokeConfig {
    /// Point distances are measured from.
    pub reference: ReferencePoint,
    /// Fire reduction stage.
    pub fire: FireSettings,
    /// AQI aggregation stage.
    pub aqi: AqiSettings,
}

impl SmokeConfig {
    /// Loads configuration from `path`, or from [`DEFAULT_CONFIG_PATH`] if
    /// it exists, or falls back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicitly named file is missing or any
    /// file read fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    log::debug!("No {DEFAULT_CONFIG_PATH}, using built-in defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on malformed input or unknown keys.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `AQS_EMAIL`/`AQS_KEY` from `lookup` over the file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(email) = lookup(EMAIL_ENV).filter(|v| !v.trim().is_empty()) {
            self.aqi.email = email;
        }
        if let Some(key) = lookup(KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.aqi.key = key;
        }
    }

    /// Checks ranges and formats.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        let reference = &self.reference;
        if !(-90.0..=90.0).contains(&reference.lat) || !(-180.0..=180.0).contains(&reference.lon) {
            return invalid(format!(
                "reference ({}, {}) is not a valid latitude/longitude",
                reference.lat, reference.lon
            ));
        }

        let aqi = &self.aqi;
        if aqi.start_year > aqi.end_year {
            return invalid(format!(
                "aqi.start_year {} is after aqi.end_year {}",
                aqi.start_year, aqi.end_year
            ));
        }
        if let Err(e) = aqi.county() {
            return invalid(e.to_string());
        }
        for mmdd in [&aqi.season_start, &aqi.season_end] {
            if let Err(e) = season_date(2000, mmdd) {
                return invalid(e.to_string());
            }
        }
        if aqi.season_start > aqi.season_end {
            return invalid(format!(
                "aqi.season_start {} is after aqi.season_end {}",
                aqi.season_start, aqi.season_end
            ));
        }
        if aqi.min_sensors == 0 {
            return invalid("aqi.min_sensors must be at least 1".to_string());
        }
        if aqi.parameters.is_empty() {
            return invalid("aqi.parameters must name at least one parameter code".to_string());
        }
        if aqi.initial_half_width_deg <= 0.0 || aqi.expansion_step_deg < 0.0 {
            return invalid(
                "aqi.initial_half_width_deg must be positive and aqi.expansion_step_deg non-negative"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Renders the effective configuration with the AQS key masked.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if !shown.aqi.key.is_empty() {
            shown.aqi.key = "********".to_string();
        }
        Ok(toml::to_string(&shown)?)
    }
}
