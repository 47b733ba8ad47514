//! Trailfix Core - Coordinates, datums and geofences for trail check-in
//!
//! This crate holds the pure geometry used by the check-in and track
//! recording pipeline. Nothing in here performs IO or keeps state.
//!
//! # Modules
//!
//! - [`coordinate`] - Latitude/longitude pairs tagged with their datum
//! - [`datum`] - WGS84 -> GCJ02 -> BD09 transforms
//! - [`geo`] - Haversine distance, radius test, path length
//! - [`fix`] - Resolved position readings and their provenance
//! - [`checkpoint`] - Checkpoints and check-in progress
//! - [`geofence`] - Check-in admission by geofence
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust
//! use trailfix_core::{Checkpoint, GeofenceEvaluator, LocalCoordinate, PositionFix, RawCoordinate};
//!
//! // A raw GPS reading must be moved into the local datum first
//! let raw = RawCoordinate::new(39.9042, 116.4074);
//! let fix = PositionFix::manual(raw.to_local_datum(), 12.0);
//!
//! let checkpoint = Checkpoint::new(1, LocalCoordinate::new(39.9056, 116.4136), 100.0);
//! let result = GeofenceEvaluator::evaluate(&fix, &checkpoint);
//! println!("in range: {}, {} m away", result.in_range, result.distance_meters);
//! ```

pub mod checkpoint;
pub mod coordinate;
pub mod datum;
pub mod error;
pub mod fix;
pub mod geo;
pub mod geofence;

// Re-exports for convenience
pub use error::{CoreError, Result};

pub use checkpoint::{checkpoints_from_json, CheckInProgress, Checkpoint};
pub use coordinate::{Bd09, Coordinate, Datum, Gcj02, LocalCoordinate, RawCoordinate, Wgs84};
pub use datum::{
    gcj02_to_bd09, is_outside_china, wgs84_to_bd09, wgs84_to_gcj02, CoordinateTransformer,
    RegionPolicy,
};
pub use fix::{FixClass, PositionFix, Provenance, SourceMethod, DEFAULT_GPS_ACCURACY_THRESHOLD_M};
pub use geo::{distance_meters, format_distance, is_within_radius, path_length_meters, EARTH_RADIUS_M};
pub use geofence::{CheckpointEvaluation, GeofenceEvaluator, GeofenceResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
