//! Datum-tagged geographic coordinates
//!
//! Every coordinate carries the reference frame it is expressed in as a type
//! parameter. Raw device readings are [`Coordinate<Wgs84>`], everything used
//! for display and distance math is [`Coordinate<Gcj02>`]. The two cannot be
//! passed to the same distance function, so a datum transform is required
//! before any comparison between a device reading and a checkpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Marker trait for coordinate reference systems
pub trait Datum:
    Copy + Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static
{
    /// Short datum name used in logs and CLI output
    const NAME: &'static str;
}

/// WGS84, the datum reported by satellite GPS receivers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wgs84;

/// GCJ02, the offset datum used for on-map display and distance math
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gcj02;

/// BD09, the further-offset datum used by Baidu maps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bd09;

impl Datum for Wgs84 {
    const NAME: &'static str = "WGS84";
}

impl Datum for Gcj02 {
    const NAME: &'static str = "GCJ02";
}

impl Datum for Bd09 {
    const NAME: &'static str = "BD09";
}

/// A latitude/longitude pair in degrees, expressed in datum `D`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Coordinate<D: Datum> {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
    #[serde(skip)]
    datum: PhantomData<D>,
}

/// Coordinate as reported by the device (WGS84)
pub type RawCoordinate = Coordinate<Wgs84>;

/// Coordinate in the local map datum (GCJ02)
pub type LocalCoordinate = Coordinate<Gcj02>;

impl<D: Datum> Coordinate<D> {
    /// Create a new coordinate
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            datum: PhantomData,
        }
    }

    /// Name of the datum this coordinate is expressed in
    pub fn datum_name(&self) -> &'static str {
        D::NAME
    }

    /// Check the latitude/longitude ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Format as `"lng,lat"` with 7 decimals, the form map SDKs expect
    pub fn to_lng_lat_string(&self) -> String {
        format!("{:.7},{:.7}", self.longitude, self.latitude)
    }
}

impl<D: Datum> fmt::Display for Coordinate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) {}",
            self.latitude,
            self.longitude,
            D::NAME
        )
    }
}
