//! Great-circle distance helpers
//!
//! All functions take coordinates of a single datum `D`. No datum transform
//! happens here.

use crate::coordinate::{Coordinate, Datum};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters
pub fn distance_meters<D: Datum>(a: &Coordinate<D>, b: &Coordinate<D>) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether `b` lies within `radius_meters` of `a` (boundary inclusive)
pub fn is_within_radius<D: Datum>(a: &Coordinate<D>, b: &Coordinate<D>, radius_meters: f64) -> bool {
    distance_meters(a, b) <= radius_meters
}

/// Total length of a polyline in meters
///
/// Returns 0 for fewer than two points.
pub fn path_length_meters<'a, D, I>(points: I) -> f64
where
    D: Datum,
    I: IntoIterator<Item = &'a Coordinate<D>>,
{
    let mut iter = points.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0.0;
    };

    let mut total = 0.0;
    for point in iter {
        total += distance_meters(prev, point);
        prev = point;
    }
    total
}

/// Human-readable distance: `"95m"` below a kilometre, `"1.2km"` above
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{}m", meters.round() as i64)
    } else {
        format!("{:.1}km", meters / 1000.0)
    }
}

impl<D: Datum> Coordinate<D> {
    /// Haversine distance to another coordinate of the same datum
    pub fn distance_to(&self, other: &Coordinate<D>) -> f64 {
        distance_meters(self, other)
    }
}
