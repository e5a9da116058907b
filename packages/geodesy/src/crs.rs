//! Coordinate reference systems and inverse projections.
//!
//! The USGS combined wildfire dataset is distributed in ESRI:102008
//! (North America Albers Equal Area Conic on NAD83). Smaller extracts and
//! hand-built samples are usually plain EPSG:4326, and some Esri services
//! hand out Web Mercator. Every vertex is brought back to EPSG:4326
//! longitude/latitude before any distance is measured.

use std::f64::consts::FRAC_PI_2;
use std::sync::LazyLock;

use geo::Point;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::GeodesyError;

/// GRS80 semi-major axis in meters (NAD83).
const GRS80_A: f64 = 6_378_137.0;

/// GRS80 inverse flattening.
const GRS80_INV_F: f64 = 298.257_222_101;

/// Sphere radius used by Web Mercator.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Maximum iterations for the Albers inverse latitude solution. Snyder
/// notes three or four are normally enough.
const ALBERS_MAX_ITERATIONS: usize = 15;

/// Convergence threshold for the Albers inverse latitude, in radians.
const ALBERS_EPSILON: f64 = 1e-12;

/// ESRI:102008 with its standard parameters.
static NORTH_AMERICA_ALBERS: LazyLock<AlbersEqualArea> =
    LazyLock::new(|| AlbersEqualArea::grs80(20.0, 60.0, 40.0, -96.0));

/// A coordinate reference system the pipeline knows how to read.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(try_from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum Crs {
    /// WGS84 geographic longitude/latitude in degrees.
    #[default]
    #[strum(to_string = "EPSG:4326", serialize = "WGS84")]
    Wgs84,
    /// North America Albers Equal Area Conic, meters.
    #[strum(to_string = "ESRI:102008", serialize = "EPSG:102008")]
    NorthAmericaAlbers,
    /// Pseudo/Web Mercator, meters.
    #[strum(to_string = "EPSG:3857", serialize = "ESRI:102100", serialize = "EPSG:900913")]
    WebMercator,
}

impl Crs {
    /// Resolves an Esri well-known id (as found in a `spatialReference`
    /// block) to a [`Crs`].
    ///
    /// # Errors
    ///
    /// Returns [`GeodesyError::UnsupportedCrs`] for unknown ids.
    pub fn from_wkid(wkid: i64) -> Result<Self, GeodesyError> {
        match wkid {
            4326 => Ok(Self::Wgs84),
            102_008 => Ok(Self::NorthAmericaAlbers),
            3857 | 102_100 | 900_913 => Ok(Self::WebMercator),
            other => Err(GeodesyError::UnsupportedCrs {
                code: format!("wkid {other}"),
            }),
        }
    }

    /// Parses a code such as `"EPSG:4326"` or `"esri:102008"`.
    ///
    /// # Errors
    ///
    /// Returns [`GeodesyError::UnsupportedCrs`] for unknown codes.
    pub fn parse_code(code: &str) -> Result<Self, GeodesyError> {
        code.trim()
            .parse()
            .map_err(|_| GeodesyError::UnsupportedCrs {
                code: code.to_string(),
            })
    }

    /// Transforms `(x, y)` in this CRS to an EPSG:4326 point
    /// (`x` = longitude, `y` = latitude).
    ///
    /// # Errors
    ///
    /// Returns [`GeodesyError::Projection`] for non-finite input, a
    /// failed inverse, or a result outside the valid lon/lat range.
    pub fn to_wgs84(self, x: f64, y: f64) -> Result<Point, GeodesyError> {
        let fail = |reason: &str| GeodesyError::Projection {
            crs: self,
            x,
            y,
            reason: reason.to_string(),
        };

        if !x.is_finite() || !y.is_finite() {
            return Err(fail("non-finite coordinate"));
        }

        let (lon, lat) = match self {
            Self::Wgs84 => (x, y),
            Self::WebMercator => web_mercator_inverse(x, y),
            Self::NorthAmericaAlbers => NORTH_AMERICA_ALBERS.inverse(x, y).map_err(fail)?,
        };

        if !(-90.0..=90.0).contains(&lat) {
            return Err(fail("latitude out of range"));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(fail("longitude out of range"));
        }

        Ok(Point::new(lon, lat))
    }
}

impl TryFrom<String> for Crs {
    type Error = GeodesyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_code(&value)
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}

fn web_mercator_inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = 2.0_f64
        .mul_add((y / WEB_MERCATOR_RADIUS).exp().atan(), -FRAC_PI_2)
        .to_degrees();
    (lon, lat)
}

/// Albers Equal-Area Conic projection on an ellipsoid.
///
/// Formulas follow Snyder, *Map Projections: A Working Manual* (1987),
/// pp. 101-102, with the iterative latitude solution for the inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
    q_pole: f64,
}

impl AlbersEqualArea {
    /// Builds the projection on the GRS80 ellipsoid. All angles are in
    /// degrees.
    #[must_use]
    pub fn grs80(lat1: f64, lat2: f64, lat0: f64, lon0: f64) -> Self {
        let f = 1.0 / GRS80_INV_F;
        let e2 = 2.0f64.mul_add(f, -(f * f));
        Self::new(GRS80_A, e2, lat1, lat2, lat0, lon0)
    }

    fn new(a: f64, e2: f64, lat1: f64, lat2: f64, lat0: f64, lon0: f64) -> Self {
        let e = e2.sqrt();
        let (phi1, phi2, phi0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());

        let m1 = m(phi1, e2);
        let m2 = m(phi2, e2);
        let q1 = q(phi1, e, e2);
        let q2 = q(phi2, e, e2);
        let q0 = q(phi0, e, e2);

        let n = if (phi1 - phi2).abs() < f64::EPSILON {
            phi1.sin()
        } else {
            m1.mul_add(m1, -(m2 * m2)) / (q2 - q1)
        };
        let c = n.mul_add(q1, m1 * m1);
        let rho0 = a * n.mul_add(-q0, c).sqrt() / n;

        Self {
            a,
            e,
            e2,
            n,
            c,
            rho0,
            lon0: lon0.to_radians(),
            q_pole: q(FRAC_PI_2, e, e2),
        }
    }

    /// Projects longitude/latitude degrees to easting/northing meters.
    #[must_use]
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let q = q(lat.to_radians(), self.e, self.e2);
        let rho = self.a * self.n.mul_add(-q, self.c).sqrt() / self.n;
        let theta = self.n * (lon.to_radians() - self.lon0);
        (rho * theta.sin(), rho.mul_add(-theta.cos(), self.rho0))
    }

    /// Inverts easting/northing meters to longitude/latitude degrees.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure when the point lies outside
    /// the projection's domain or the latitude iteration fails to
    /// converge.
    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), &'static str> {
        let sign = self.n.signum();
        let dy = self.rho0 - y;
        let rho = sign * x.hypot(dy);
        let theta = (sign * x).atan2(sign * dy);

        let q = (self.c - (rho * rho * self.n * self.n) / (self.a * self.a)) / self.n;
        if !q.is_finite() {
            return Err("point outside projection domain");
        }

        let lat = if (q.abs() - self.q_pole).abs() < 1e-10 {
            FRAC_PI_2.copysign(q)
        } else if q.abs() > self.q_pole {
            return Err("point outside projection domain");
        } else {
            self.solve_latitude(q)?
        };

        let mut lon = (self.lon0 + theta / self.n).to_degrees();
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }

        Ok((lon, lat.to_degrees()))
    }

    fn solve_latitude(&self, q: f64) -> Result<f64, &'static str> {
        let mut phi = (q / 2.0).asin();
        let one_minus_e2 = 1.0 - self.e2;

        for _ in 0..ALBERS_MAX_ITERATIONS {
            let sin_phi = phi.sin();
            let cos_phi = phi.cos();
            let one = (self.e2 * sin_phi).mul_add(-sin_phi, 1.0);
            let log_term =
                ((1.0 - self.e * sin_phi) / self.e.mul_add(sin_phi, 1.0)).ln() / (2.0 * self.e);
            let delta = (one * one) / (2.0 * cos_phi)
                * (q / one_minus_e2 - sin_phi / one + log_term);

            if !delta.is_finite() {
                return Err("latitude iteration diverged");
            }
            phi += delta;
            if delta.abs() < ALBERS_EPSILON {
                return Ok(phi);
            }
        }

        Err("latitude iteration did not converge")
    }
}

/// Snyder eq. 14-15.
fn m(phi: f64, e2: f64) -> f64 {
    let sin_phi = phi.sin();
    phi.cos() / (e2 * sin_phi).mul_add(-sin_phi, 1.0).sqrt()
}

/// Snyder eq. 3-12.
fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let sin_phi = phi.sin();
    let one = (e2 * sin_phi).mul_add(-sin_phi, 1.0);
    let log_term = ((1.0 - e * sin_phi) / e.mul_add(sin_phi, 1.0)).ln() / (2.0 * e);
    (1.0 - e2) * (sin_phi / one - log_term)
}

/// Web Mercator forward, used by tests to build projected fixtures.
#[cfg(test)]
fn web_mercator_forward(lon: f64, lat: f64) -> (f64, f64) {
    use std::f64::consts::FRAC_PI_4;

    let x = WEB_MERCATOR_RADIUS * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}
