//! Datum transforms (WGS84 -> GCJ02 -> BD09)
//!
//! The GCJ02 offset is an empirical, non-linear correction: two
//! polynomial/trigonometric functions of `(lon - 105, lat - 35)` give raw
//! offsets in meters, which are scaled to degrees using the Krasovsky 1940
//! ellipsoid at the point's latitude and added to the input.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::coordinate::{Bd09, Coordinate, Gcj02, Wgs84};

/// BD09 rotation constant
const X_PI: f64 = PI * 3000.0 / 180.0;

/// Krasovsky 1940 semi-major axis in meters
pub const KRASOVSKY_A: f64 = 6378245.0;

/// Krasovsky 1940 first eccentricity squared
pub const KRASOVSKY_EE: f64 = 0.00669342162296594323;

/// Longitude range of the mainland bounding box
pub const MAINLAND_LON_RANGE: (f64, f64) = (72.004, 137.8347);

/// Latitude range of the mainland bounding box
pub const MAINLAND_LAT_RANGE: (f64, f64) = (0.8293, 55.8271);

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lng(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

/// Convert a raw WGS84 coordinate to GCJ02
///
/// Pure and total: every input produces an output, and identical inputs
/// produce bit-identical outputs.
pub fn wgs84_to_gcj02(raw: &Coordinate<Wgs84>) -> Coordinate<Gcj02> {
    let lat = raw.latitude;
    let lng = raw.longitude;

    let mut dlat = transform_lat(lng - 105.0, lat - 35.0);
    let mut dlng = transform_lng(lng - 105.0, lat - 35.0);

    let radlat = lat / 180.0 * PI;
    let sin_lat = radlat.sin();
    let magic = 1.0 - KRASOVSKY_EE * sin_lat * sin_lat;
    let sqrt_magic = magic.sqrt();

    dlat = (dlat * 180.0) / ((KRASOVSKY_A * (1.0 - KRASOVSKY_EE)) / (magic * sqrt_magic) * PI);
    dlng = (dlng * 180.0) / (KRASOVSKY_A / sqrt_magic * radlat.cos() * PI);

    Coordinate::new(lat + dlat, lng + dlng)
}

/// Convert a GCJ02 coordinate to BD09
pub fn gcj02_to_bd09(local: &Coordinate<Gcj02>) -> Coordinate<Bd09> {
    let x = local.longitude;
    let y = local.latitude;
    let z = (x * x + y * y).sqrt() + 0.00002 * (y * X_PI).sin();
    let theta = y.atan2(x) + 0.000003 * (x * X_PI).cos();
    Coordinate::new(z * theta.sin() + 0.006, z * theta.cos() + 0.0065)
}

/// Convert a raw WGS84 coordinate straight to BD09
pub fn wgs84_to_bd09(raw: &Coordinate<Wgs84>) -> Coordinate<Bd09> {
    gcj02_to_bd09(&wgs84_to_gcj02(raw))
}

/// Whether a raw coordinate falls outside the mainland bounding box
pub fn is_outside_china(raw: &Coordinate<Wgs84>) -> bool {
    raw.longitude < MAINLAND_LON_RANGE.0
        || raw.longitude > MAINLAND_LON_RANGE.1
        || raw.latitude < MAINLAND_LAT_RANGE.0
        || raw.latitude > MAINLAND_LAT_RANGE.1
}

impl Coordinate<Wgs84> {
    /// Convert to the local map datum (GCJ02)
    pub fn to_local_datum(&self) -> Coordinate<Gcj02> {
        wgs84_to_gcj02(self)
    }
}

impl Coordinate<Gcj02> {
    /// Convert to BD09
    pub fn to_bd09(&self) -> Coordinate<Bd09> {
        gcj02_to_bd09(self)
    }
}

/// Where the GCJ02 correction is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionPolicy {
    /// Apply the correction to every coordinate
    #[default]
    Always,
    /// Pass coordinates outside the mainland bounding box through unchanged
    MainlandOnly,
}

/// Converts raw device coordinates into the local datum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinateTransformer {
    policy: RegionPolicy,
}

impl CoordinateTransformer {
    /// Create a transformer with the given region policy
    pub fn new(policy: RegionPolicy) -> Self {
        Self { policy }
    }

    /// Region policy in effect
    pub fn policy(&self) -> RegionPolicy {
        self.policy
    }

    /// Convert a raw coordinate into the local datum
    pub fn to_local_datum(&self, raw: &Coordinate<Wgs84>) -> Coordinate<Gcj02> {
        match self.policy {
            RegionPolicy::MainlandOnly if is_outside_china(raw) => {
                Coordinate::new(raw.latitude, raw.longitude)
            }
            _ => wgs84_to_gcj02(raw),
        }
    }
}
