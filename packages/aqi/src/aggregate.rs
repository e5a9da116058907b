//! Yearly aggregation with bounding-box fallback.
//!
//! For each year the county is queried first. When it yields fewer than
//! `min_sensors` distinct sensors, boxes of growing half-width around the
//! county centroid are tried in turn:
//!
//! 1. the first box reaching `min_sensors` is used;
//! 2. otherwise the largest box that found any sensor;
//! 3. otherwise the county readings, if any sensor reported;
//! 4. otherwise the year is skipped with "no sensor data".
//!
//! A year whose requests fail after retries is skipped and the run moves
//! on to the next year.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use smoke_aqi_models::{AqiSettings, AqiYearRecord, BoundingBox, CountyFips, SensorReading, season_date};
use smoke_batch::BatchSummary;
use smoke_batch::progress::ProgressCallback;
use smoke_geodesy::CountyBoundary;

use crate::{AqiError, AqiSource};

/// Number of distinct sensors with at least one AQI value.
#[must_use]
pub fn distinct_sensors(readings: &[SensorReading]) -> usize {
    readings
        .iter()
        .filter(|r| r.aqi.is_some())
        .map(|r| &r.sensor)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Mean AQI per year over every reading that has a value, ordered by year.
#[must_use]
pub fn mean_by_year(readings: &[SensorReading]) -> Vec<AqiYearRecord> {
    let mut sums: BTreeMap<i32, (f64, u32)> = BTreeMap::new();
    for reading in readings {
        if let Some(aqi) = reading.aqi {
            let entry = sums.entry(reading.year()).or_default();
            entry.0 += aqi;
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|(year, (sum, count))| AqiYearRecord {
            year,
            mean_aqi: sum / f64::from(count),
        })
        .collect()
}

/// Returns `true` when a query found too few sensors to stand on its own.
#[must_use]
pub const fn needs_fallback(sensor_count: usize, min_sensors: usize) -> bool {
    sensor_count < min_sensors
}

/// Shape of the fallback box sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackPolicy {
    /// Half-width of the first box, in degrees.
    pub initial_half_width_deg: f64,
    /// Half-width growth per step, in degrees.
    pub expansion_step_deg: f64,
    /// Number of boxes.
    pub max_expansions: u32,
}

impl FallbackPolicy {
    /// The policy configured in `settings`.
    #[must_use]
    pub const fn from_settings(settings: &AqiSettings) -> Self {
        Self {
            initial_half_width_deg: settings.initial_half_width_deg,
            expansion_step_deg: settings.expansion_step_deg,
            max_expansions: settings.max_expansions,
        }
    }

    /// Boxes to try around `(lat, lon)`, smallest first, each paired with
    /// its half-width.
    pub fn boxes(&self, lat: f64, lon: f64) -> impl Iterator<Item = (f64, BoundingBox)> + '_ {
        (0..self.max_expansions).map(move |step| {
            let half_width = self
                .expansion_step_deg
                .mul_add(f64::from(step), self.initial_half_width_deg);
            (half_width, BoundingBox::around(lat, lon, half_width))
        })
    }
}

/// Which query a year's mean was computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoverageSource {
    /// The county query.
    County,
    /// A fallback box of the given half-width.
    Box {
        /// Half-width in degrees.
        half_width_deg: f64,
    },
}

impl fmt::Display for CoverageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::County => f.write_str("county"),
            Self::Box { half_width_deg } => write!(f, "box ±{half_width_deg}°"),
        }
    }
}

/// How one year was covered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearCoverage {
    /// Calendar year.
    pub year: i32,
    /// Query the readings came from.
    pub source: CoverageSource,
    /// Distinct sensors with values.
    pub sensors: usize,
    /// Readings with values.
    pub readings: usize,
}

/// Result of an aggregation run.
#[derive(Debug, Clone)]
pub struct AqiOutcome {
    /// One row per covered year, ordered by year.
    pub records: Vec<AqiYearRecord>,
    /// Coverage details for each row.
    pub coverage: Vec<YearCoverage>,
    /// Success/skip accounting per year.
    pub summary: BatchSummary,
}

struct Selection {
    readings: Vec<SensorReading>,
    source: CoverageSource,
    sensors: usize,
}

/// Aggregates every year in `settings.start_year..=settings.end_year`.
///
/// With a `boundary`, its centroid replaces the configured centroid and
/// county readings from sensors outside the polygon are dropped.
///
/// # Errors
///
/// Returns [`AqiError::Settings`] for an invalid county code or season
/// window. Per-year failures are recorded in the summary instead.
pub async fn aggregate_years(
    source: &dyn AqiSource,
    settings: &AqiSettings,
    boundary: Option<&CountyBoundary>,
    progress: &dyn ProgressCallback,
) -> Result<AqiOutcome, AqiError> {
    let start = Instant::now();
    let county = settings.county()?;
    season_date(2000, &settings.season_start)?;
    season_date(2000, &settings.season_end)?;

    let (lat, lon) = boundary
        .and_then(CountyBoundary::centroid)
        .map_or((settings.centroid_lat, settings.centroid_lon), |c| (c.y(), c.x()));
    let policy = FallbackPolicy::from_settings(settings);

    log::info!(
        "Aggregating AQI for county {county} ({}-{}), centroid ({lat:.4}, {lon:.4})",
        settings.start_year,
        settings.end_year
    );

    let years = settings.start_year..=settings.end_year;
    progress.set_total(u64::try_from(years.clone().count()).unwrap_or(u64::MAX));

    let mut records = Vec::new();
    let mut coverage = Vec::new();
    let mut summary = BatchSummary::new("aqi");

    for year in years {
        progress.set_message(year.to_string());

        let selection = select_readings(
            source,
            year,
            &county,
            (lat, lon),
            &policy,
            settings.min_sensors,
            boundary,
        )
        .await;

        match selection {
            Ok(Some(selection)) => {
                let record = mean_by_year(&selection.readings)
                    .into_iter()
                    .find(|r| r.year == year);
                if let Some(record) = record {
                    let readings = selection.readings.iter().filter(|r| r.aqi.is_some()).count();
                    log::info!(
                        "{year}: mean AQI {:.1} from {} sensor(s), {readings} reading(s) ({})",
                        record.mean_aqi,
                        selection.sensors,
                        selection.source
                    );
                    coverage.push(YearCoverage {
                        year,
                        source: selection.source,
                        sensors: selection.sensors,
                        readings,
                    });
                    records.push(record);
                    summary.record_success();
                } else {
                    summary.record_skip(year.to_string(), "no sensor data");
                }
            }
            Ok(None) => summary.record_skip(year.to_string(), "no sensor data"),
            Err(e) => summary.record_skip(year.to_string(), e.to_string()),
        }

        progress.inc(1);
    }

    progress.finish(format!("{} of {} years", records.len(), summary.total()));
    summary.log();
    log::info!("AQI aggregation finished in {:.1}s", start.elapsed().as_secs_f64());

    Ok(AqiOutcome {
        records,
        coverage,
        summary,
    })
}

async fn select_readings(
    source: &dyn AqiSource,
    year: i32,
    county: &CountyFips,
    (lat, lon): (f64, f64),
    policy: &FallbackPolicy,
    min_sensors: usize,
    boundary: Option<&CountyBoundary>,
) -> Result<Option<Selection>, AqiError> {
    let mut county_readings = source.readings_by_county(year, county).await?;
    if let Some(boundary) = boundary {
        county_readings.retain(|r| boundary.contains(r.longitude, r.latitude));
    }

    let county_sensors = distinct_sensors(&county_readings);
    if !needs_fallback(county_sensors, min_sensors) {
        return Ok(Some(Selection {
            readings: county_readings,
            source: CoverageSource::County,
            sensors: county_sensors,
        }));
    }

    log::info!("{year}: county has {county_sensors} sensor(s), fewer than {min_sensors}; widening");

    let mut largest: Option<Selection> = None;
    for (half_width_deg, bbox) in policy.boxes(lat, lon) {
        let readings = source.readings_by_box(year, &bbox).await?;
        let sensors = distinct_sensors(&readings);
        log::debug!("{year}: {bbox} has {sensors} sensor(s)");

        let selection = Selection {
            readings,
            source: CoverageSource::Box { half_width_deg },
            sensors,
        };
        if !needs_fallback(sensors, min_sensors) {
            return Ok(Some(selection));
        }
        if sensors > 0 {
            largest = Some(selection);
        }
    }

    if largest.is_some() {
        return Ok(largest);
    }
    if county_sensors > 0 {
        return Ok(Some(Selection {
            readings: county_readings,
            source: CoverageSource::County,
            sensors: county_sensors,
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use smoke_aqi_models::SensorId;
    use smoke_batch::progress::NullProgress;

    use super::*;

    fn reading(site: &str, year: i32, lat: f64, lon: f64, aqi: Option<f64>) -> SensorReading {
        SensorReading {
            sensor: SensorId {
                state_code: "04".to_string(),
                county_code: "015".to_string(),
                site_number: site.to_string(),
                parameter_code: "88101".to_string(),
                poc: 1,
            },
            date: NaiveDate::from_ymd_opt(year, 6, 1).unwrap(),
            latitude: lat,
            longitude: lon,
            aqi,
        }
    }

    /// Serves county readings by year and box readings from a regional
    /// pool filtered to the requested box.
    #[derive(Default)]
    struct FakeSource {
        county: Vec<SensorReading>,
        region: Vec<SensorReading>,
        failing_years: HashSet<i32>,
        boxes_requested: Mutex<Vec<BoundingBox>>,
    }

    #[async_trait]
    impl AqiSource for FakeSource {
        async fn readings_by_county(
            &self,
            year: i32,
            _county: &CountyFips,
        ) -> Result<Vec<SensorReading>, AqiError> {
            if self.failing_years.contains(&year) {
                return Err(AqiError::Status {
                    status: 503,
                    path: "/dailyData/byCounty".to_string(),
                });
            }
            Ok(self.county.iter().filter(|r| r.year() == year).cloned().collect())
        }

        async fn readings_by_box(
            &self,
            year: i32,
            bbox: &BoundingBox,
        ) -> Result<Vec<SensorReading>, AqiError> {
            self.boxes_requested.lock().unwrap().push(*bbox);
            Ok(self
                .region
                .iter()
                .filter(|r| r.year() == year && bbox.contains(r.latitude, r.longitude))
                .cloned()
                .collect())
        }
    }

    fn settings(start_year: i32, end_year: i32, min_sensors: usize) -> AqiSettings {
        AqiSettings {
            start_year,
            end_year,
            min_sensors,
            centroid_lat: 35.0,
            centroid_lon: -114.0,
            initial_half_width_deg: 0.5,
            expansion_step_deg: 0.5,
            max_expansions: 3,
            ..AqiSettings::default()
        }
    }

    #[test]
    fn mean_of_two_readings() {
        let readings = vec![
            reading("1", 2020, 35.0, -114.0, Some(50.0)),
            reading("2", 2020, 35.0, -114.0, Some(60.0)),
            reading("2", 2020, 35.0, -114.0, None),
            reading("1", 2021, 35.0, -114.0, Some(10.0)),
        ];
        let means = mean_by_year(&readings);
        assert_eq!(
            means,
            vec![
                AqiYearRecord { year: 2020, mean_aqi: 55.0 },
                AqiYearRecord { year: 2021, mean_aqi: 10.0 },
            ]
        );
    }

    #[test]
    fn sensors_without_values_do_not_count() {
        let readings = vec![
            reading("1", 2020, 35.0, -114.0, Some(50.0)),
            reading("1", 2020, 35.0, -114.0, Some(52.0)),
            reading("2", 2020, 35.0, -114.0, None),
        ];
        assert_eq!(distinct_sensors(&readings), 1);
        assert_eq!(distinct_sensors(&[]), 0);
    }

    #[test]
    fn fallback_threshold() {
        assert!(needs_fallback(0, 1));
        assert!(needs_fallback(2, 3));
        assert!(!needs_fallback(3, 3));
        assert!(!needs_fallback(4, 3));
    }

    #[test]
    fn boxes_grow_by_step() {
        let policy = FallbackPolicy {
            initial_half_width_deg: 0.5,
            expansion_step_deg: 0.25,
            max_expansions: 3,
        };
        let widths: Vec<f64> = policy.boxes(35.0, -114.0).map(|(w, _)| w).collect();
        assert_eq!(widths, vec![0.5, 0.75, 1.0]);

        let (_, last) = policy.boxes(35.0, -114.0).last().unwrap();
        assert!((last.min_lat - 34.0).abs() < 1e-12);
        assert!((last.max_lon - -113.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn county_with_enough_sensors_skips_fallback() {
        let source = FakeSource {
            county: vec![
                reading("1", 2020, 35.0, -114.0, Some(50.0)),
                reading("2", 2020, 35.1, -114.1, Some(60.0)),
            ],
            ..FakeSource::default()
        };

        let outcome = aggregate_years(&source, &settings(2020, 2020, 2), None, &NullProgress)
            .await
            .unwrap();

        assert_eq!(outcome.records, vec![AqiYearRecord { year: 2020, mean_aqi: 55.0 }]);
        assert_eq!(outcome.coverage[0].source, CoverageSource::County);
        assert!(source.boxes_requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_sufficient_box_wins() {
        let source = FakeSource {
            county: vec![reading("1", 2020, 35.0, -114.0, Some(40.0))],
            region: vec![
                reading("1", 2020, 35.0, -114.0, Some(40.0)),
                reading("2", 2020, 35.8, -114.0, Some(80.0)),
                reading("3", 2020, 36.4, -114.0, Some(100.0)),
            ],
            ..FakeSource::default()
        };

        let outcome = aggregate_years(&source, &settings(2020, 2020, 2), None, &NullProgress)
            .await
            .unwrap();

        assert_eq!(outcome.records, vec![AqiYearRecord { year: 2020, mean_aqi: 60.0 }]);
        assert_eq!(
            outcome.coverage[0].source,
            CoverageSource::Box { half_width_deg: 1.0 }
        );
        assert_eq!(source.boxes_requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn largest_box_with_sensors_then_county() {
        // Nothing reaches three sensors: the largest box with any sensor wins.
        let source = FakeSource {
            county: vec![reading("1", 2020, 35.0, -114.0, Some(40.0))],
            region: vec![reading("9", 2020, 36.4, -114.0, Some(90.0))],
            ..FakeSource::default()
        };
        let outcome = aggregate_years(&source, &settings(2020, 2020, 3), None, &NullProgress)
            .await
            .unwrap();
        assert_eq!(outcome.records[0].mean_aqi, 90.0);
        assert_eq!(
            outcome.coverage[0].source,
            CoverageSource::Box { half_width_deg: 1.5 }
        );

        // No box finds anything: fall back to the county readings.
        let source = FakeSource {
            county: vec![reading("1", 2020, 35.0, -114.0, Some(40.0))],
            ..FakeSource::default()
        };
        let outcome = aggregate_years(&source, &settings(2020, 2020, 3), None, &NullProgress)
            .await
            .unwrap();
        assert_eq!(outcome.records[0].mean_aqi, 40.0);
        assert_eq!(outcome.coverage[0].source, CoverageSource::County);
    }

    #[tokio::test]
    async fn failures_and_empty_years_are_skipped() {
        let source = FakeSource {
            county: vec![
                reading("1", 2019, 35.0, -114.0, Some(30.0)),
                reading("1", 2021, 35.0, -114.0, Some(70.0)),
            ],
            failing_years: HashSet::from([2021]),
            ..FakeSource::default()
        };

        let outcome = aggregate_years(&source, &settings(2019, 2021, 1), None, &NullProgress)
            .await
            .unwrap();

        assert_eq!(outcome.records, vec![AqiYearRecord { year: 2019, mean_aqi: 30.0 }]);
        assert_eq!(outcome.summary.total(), 3);
        assert_eq!(outcome.summary.succeeded(), 1);
        let skipped = outcome.summary.skipped();
        assert_eq!(skipped[0].key, "2020");
        assert_eq!(skipped[0].reason, "no sensor data");
        assert_eq!(skipped[1].key, "2021");
        assert!(skipped[1].reason.contains("503"));
    }

    #[tokio::test]
    async fn boundary_filters_county_and_moves_centroid() {
        let boundary = CountyBoundary::from_geojson_str(
            r#"{ "type": "Polygon",
                 "coordinates": [[[-115.0, 34.0], [-113.0, 34.0], [-113.0, 36.0], [-115.0, 36.0], [-115.0, 34.0]]] }"#,
        )
        .unwrap();
        let source = FakeSource {
            county: vec![
                reading("1", 2020, 35.0, -114.0, Some(20.0)),
                reading("2", 2020, 37.0, -114.0, Some(200.0)),
            ],
            ..FakeSource::default()
        };

        let mut settings = settings(2020, 2020, 2);
        settings.centroid_lat = 0.0;
        settings.centroid_lon = 0.0;
        settings.max_expansions = 1;

        let outcome = aggregate_years(&source, &settings, Some(&boundary), &NullProgress)
            .await
            .unwrap();

        assert_eq!(outcome.records[0].mean_aqi, 20.0);
        let requested = source.boxes_requested.lock().unwrap();
        assert_eq!(requested.len(), 1);
        assert!(requested[0].contains(35.0, -114.0));
    }

    #[tokio::test]
    async fn invalid_county_is_fatal() {
        let mut settings = settings(2020, 2020, 1);
        settings.county_fips = "15".to_string();
        let result = aggregate_years(&FakeSource::default(), &settings, None, &NullProgress).await;
        assert!(matches!(result, Err(AqiError::Settings(_))));
    }
}
