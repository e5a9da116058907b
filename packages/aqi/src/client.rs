//! EPA AQS daily data client.
//!
//! Queries `dailyData/byCounty` and `dailyData/byBox` for the configured
//! parameter codes over each year's season window. AQS accepts at most
//! five parameter codes per request, so codes are sent in chunks, and it
//! asks callers to pause between requests.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use smoke_aqi_models::{AqiSettings, BoundingBox, CountyFips, SensorId, SensorReading, season_date};

use crate::retry::{self, RetryPolicy};
use crate::{AqiError, AqiSource};

/// Most parameter codes AQS accepts in one request.
pub const MAX_PARAMS_PER_REQUEST: usize = 5;

const STATUS_SUCCESS: &str = "Success";
const STATUS_NO_DATA: &str = "No data matched your selection";

/// Client for the EPA AQS data API.
pub struct AqsClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
    key: String,
    parameters: Vec<String>,
    season_start: String,
    season_end: String,
    policy: RetryPolicy,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Header")]
    header: Vec<EnvelopeHeader>,
    #[serde(rename = "Data", default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeHeader {
    status: String,
    #[serde(default)]
    error: Value,
}

#[derive(Debug, Deserialize)]
struct DailyRow {
    state_code: String,
    county_code: String,
    site_number: String,
    parameter_code: String,
    poc: u32,
    latitude: f64,
    longitude: f64,
    date_local: String,
    aqi: Option<f64>,
}

impl AqsClient {
    /// Builds a client from the AQI settings.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError::MissingCredentials`] without an email and key,
    /// [`AqiError::Settings`] for an invalid season window, and
    /// [`AqiError::Http`] if the HTTP client cannot be built.
    pub fn from_settings(settings: &AqiSettings) -> Result<Self, AqiError> {
        if settings.email.trim().is_empty() || settings.key.trim().is_empty() {
            return Err(AqiError::MissingCredentials);
        }
        // 2000 is a leap year, so "0229" passes here and is checked per year later.
        season_date(2000, &settings.season_start)?;
        season_date(2000, &settings.season_end)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("smoke/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            email: settings.email.trim().to_string(),
            key: settings.key.trim().to_string(),
            parameters: settings.parameters.clone(),
            season_start: settings.season_start.clone(),
            season_end: settings.season_end.clone(),
            policy: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.retry_base_delay_ms),
            ),
            request_delay: Duration::from_millis(settings.request_delay_ms),
            last_request: Mutex::new(None),
        })
    }

    async fn daily_data(
        &self,
        service: &str,
        year: i32,
        location: &[(&str, String)],
    ) -> Result<Vec<SensorReading>, AqiError> {
        let url = format!("{}/dailyData/{service}", self.base_url);
        let bdate = season_date(year, &self.season_start)?;
        let edate = season_date(year, &self.season_end)?;

        let mut readings = Vec::new();
        for chunk in self.parameters.chunks(MAX_PARAMS_PER_REQUEST) {
            let param = chunk.join(",");
            self.pace().await;
            log::debug!("AQS {service} {year} param={param}");

            let body = retry::send_json(
                || {
                    self.client
                        .get(&url)
                        .query(&[
                            ("email", self.email.as_str()),
                            ("key", self.key.as_str()),
                            ("param", param.as_str()),
                            ("bdate", bdate.as_str()),
                            ("edate", edate.as_str()),
                        ])
                        .query(location)
                },
                self.policy,
            )
            .await?;

            readings.extend(parse_envelope(body)?);
        }

        log::debug!("AQS {service} {year}: {} readings", readings.len());
        Ok(readings)
    }

    /// Waits until `request_delay` has passed since the previous request.
    async fn pace(&self) {
        let wait = {
            let mut last = self
                .last_request
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = Instant::now();
            let wait = last
                .map(|previous| self.request_delay.saturating_sub(now.saturating_duration_since(previous)))
                .unwrap_or_default();
            *last = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl AqiSource for AqsClient {
    async fn readings_by_county(
        &self,
        year: i32,
        county: &CountyFips,
    ) -> Result<Vec<SensorReading>, AqiError> {
        self.daily_data(
            "byCounty",
            year,
            &[
                ("state", county.state().to_string()),
                ("county", county.county().to_string()),
            ],
        )
        .await
    }

    async fn readings_by_box(
        &self,
        year: i32,
        bbox: &BoundingBox,
    ) -> Result<Vec<SensorReading>, AqiError> {
        self.daily_data(
            "byBox",
            year,
            &[
                ("minlat", format!("{:.4}", bbox.min_lat)),
                ("maxlat", format!("{:.4}", bbox.max_lat)),
                ("minlon", format!("{:.4}", bbox.min_lon)),
                ("maxlon", format!("{:.4}", bbox.max_lon)),
            ],
        )
        .await
    }
}

/// Unwraps an AQS response envelope into readings.
fn parse_envelope(body: Value) -> Result<Vec<SensorReading>, AqiError> {
    let envelope: Envelope = serde_json::from_value(body)?;
    let Some(header) = envelope.header.first() else {
        return Err(AqiError::Api {
            message: "response has an empty Header".to_string(),
        });
    };

    match header.status.as_str() {
        STATUS_SUCCESS => {}
        STATUS_NO_DATA => return Ok(Vec::new()),
        status => {
            return Err(AqiError::Api {
                message: format!("{status}: {}", header.error),
            });
        }
    }

    let total = envelope.data.len();
    let readings: Vec<SensorReading> = envelope.data.into_iter().filter_map(parse_row).collect();
    if readings.len() < total {
        log::debug!("Dropped {} unreadable AQS rows", total - readings.len());
    }
    Ok(readings)
}

fn parse_row(row: Value) -> Option<SensorReading> {
    let row: DailyRow = serde_json::from_value(row).ok()?;
    let date = NaiveDate::parse_from_str(&row.date_local, "%Y-%m-%d").ok()?;

    Some(SensorReading {
        sensor: SensorId {
            state_code: row.state_code,
            county_code: row.county_code,
            site_number: row.site_number,
            parameter_code: row.parameter_code,
            poc: row.poc,
        },
        date,
        latitude: row.latitude,
        longitude: row.longitude,
        aqi: row.aqi,
    })
}
