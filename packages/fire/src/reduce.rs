//! Perimeter distance reduction.
//!
//! Each fire is reduced to the single perimeter vertex closest to the
//! reference point and the geodesic distance to it. Vertices are
//! reprojected into EPSG:4326 on the fly, so projected inputs never need
//! a separate conversion pass.

use std::path::Path;
use std::time::Instant;

use smoke_batch::BatchSummary;
use smoke_batch::progress::ProgressCallback;
use smoke_fire_models::{FireRecord, ReducedFireRecord, ReferencePoint, Ring};
use smoke_geodesy::distance::try_nearest_vertex;
use smoke_geodesy::{Crs, GeodesyError, NearestVertex, Point};

use crate::reader::{self, header_crs};
use crate::record::{parse_record, record_key};
use crate::{FireDataError, FireError};

/// Reduces fire perimeters against a fixed reference point.
#[derive(Debug, Clone)]
pub struct PerimeterReducer {
    reference: ReferencePoint,
    origin: Point,
    default_crs: Crs,
}

impl PerimeterReducer {
    /// Creates a reducer measuring from `reference`. `default_crs` applies
    /// to inputs whose header declares no CRS.
    #[must_use]
    pub fn new(reference: ReferencePoint, default_crs: Crs) -> Self {
        let origin = reference.point();
        Self {
            reference,
            origin,
            default_crs,
        }
    }

    /// Finds the vertex across all `rings` (in `crs`) closest to the
    /// reference point.
    ///
    /// # Errors
    ///
    /// Returns [`FireDataError::MalformedRecord`] if the rings hold no
    /// vertices and [`FireDataError::GeoProjection`] if any vertex fails to
    /// reproject.
    pub fn closest_vertex(&self, rings: &[Ring], crs: Crs) -> Result<NearestVertex, FireDataError> {
        let vertices = rings.iter().flatten().map(|&[x, y]| crs.to_wgs84(x, y));
        try_nearest_vertex::<_, GeodesyError>(self.origin, vertices)?
            .ok_or_else(|| FireDataError::malformed("perimeter has no vertices"))
    }

    /// Reduces one fire to its row of `wf_data.csv`.
    ///
    /// # Errors
    ///
    /// See [`Self::closest_vertex`].
    pub fn reduce(&self, record: &FireRecord, crs: Crs) -> Result<ReducedFireRecord, FireDataError> {
        let nearest = self.closest_vertex(&record.rings, crs)?;
        log::trace!(
            "{}: nearest of {} vertices is {:.2} mi",
            record.id,
            record.vertex_count(),
            nearest.distance_miles
        );

        Ok(ReducedFireRecord {
            year: record.year,
            id: record.id.clone(),
            name: record.name.clone(),
            size_acres: record.size_acres,
            fire_type: record.fire_type,
            closest_lat: nearest.point.y(),
            closest_lon: nearest.point.x(),
            distance_miles: nearest.distance_miles,
        })
    }
}

/// Result of reducing a whole input file.
#[derive(Debug, Clone)]
pub struct ReductionOutcome {
    /// One reduced row per successfully processed fire, in input order.
    pub records: Vec<ReducedFireRecord>,
    /// Success/skip accounting; `total()` equals the input feature count.
    pub summary: BatchSummary,
}

/// Streams `path` and reduces every feature.
///
/// The CRS declared by the file header wins over the reducer's default.
/// Records that fail to parse or reproject are skipped and reported in the
/// summary; they never abort the run.
///
/// # Errors
///
/// Returns [`FireError`] when the file cannot be read or parsed as a whole,
/// or when its header declares an unsupported CRS.
pub fn reduce_file(
    path: &Path,
    reducer: &PerimeterReducer,
    progress: &dyn ProgressCallback,
) -> Result<ReductionOutcome, FireError> {
    let start = Instant::now();
    log::info!(
        "Reducing {} against {} ({}, {})",
        path.display(),
        reducer.reference.name,
        reducer.reference.lat,
        reducer.reference.lon
    );

    let mut records = Vec::new();
    let mut summary = BatchSummary::new("fires");
    let mut crs_error: Option<GeodesyError> = None;
    let mut ordinal = 0_u64;

    let document = reader::read_features(path, progress, |header, feature| {
        ordinal += 1;
        if crs_error.is_some() {
            return;
        }

        let crs = match header_crs(header) {
            Ok(crs) => crs.unwrap_or(reducer.default_crs),
            Err(e) => {
                crs_error = Some(e);
                return;
            }
        };

        match parse_record(&feature).and_then(|record| reducer.reduce(&record, crs)) {
            Ok(reduced) => {
                records.push(reduced);
                summary.record_success();
            }
            Err(e) => summary.record_skip(record_key(&feature, ordinal), e.to_string()),
        }

        if ordinal % 10_000 == 0 {
            progress.set_message(format!("{ordinal} fires"));
        }
    })?;

    if let Some(e) = crs_error {
        return Err(e.into());
    }

    progress.finish(format!("{} fires", document.feature_count));
    summary.log();
    log::info!(
        "Reduced {} of {} fires in {:.1}s",
        summary.succeeded(),
        document.feature_count,
        start.elapsed().as_secs_f64()
    );

    Ok(ReductionOutcome { records, summary })
}
