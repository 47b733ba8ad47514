//! Resolved position readings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::{LocalCoordinate, RawCoordinate};

/// Default accuracy threshold separating GPS-like from network-like fixes
pub const DEFAULT_GPS_ACCURACY_THRESHOLD_M: f64 = 100.0;

/// How a fix was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMethod {
    /// Device position sensor
    DeviceSensor,
    /// Secondary (map SDK) provider
    SecondaryProvider,
    /// Coordinate entered or chosen by the caller
    ManualOverride,
}

impl std::fmt::Display for SourceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceMethod::DeviceSensor => write!(f, "device-sensor"),
            SourceMethod::SecondaryProvider => write!(f, "secondary-provider"),
            SourceMethod::ManualOverride => write!(f, "manual-override"),
        }
    }
}

/// Heuristic classification of a fix by its reported accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixClass {
    /// Accuracy good enough to come from satellites
    GpsLike,
    /// Coarse accuracy typical of Wi-Fi/cell positioning
    NetworkLike,
}

impl FixClass {
    /// Classify an accuracy figure against `threshold_meters`
    ///
    /// Fixes strictly better than the threshold are GPS-like.
    pub fn from_accuracy(accuracy_meters: f64, threshold_meters: f64) -> Self {
        if accuracy_meters < threshold_meters {
            FixClass::GpsLike
        } else {
            FixClass::NetworkLike
        }
    }
}

/// Optional metadata describing where a fix came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Time the provider took to answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// GPS-like / network-like hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<FixClass>,
    /// Human-readable place description from a reverse lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
}

impl Provenance {
    /// True when no metadata was recorded
    pub fn is_empty(&self) -> bool {
        self.response_time_ms.is_none() && self.classification.is_none() && self.descriptor.is_none()
    }
}

/// One resolved position reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// Position in the local datum
    pub coordinate: LocalCoordinate,
    /// Position as reported by the device, when the device reported WGS84
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_coordinate: Option<RawCoordinate>,
    /// Reported accuracy radius in meters
    pub accuracy_meters: f64,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// How the reading was obtained
    pub source_method: SourceMethod,
    /// Optional provenance metadata
    #[serde(default, skip_serializing_if = "Provenance::is_empty")]
    pub provenance: Provenance,
}

impl PositionFix {
    /// Build a fix the caller chose explicitly (e.g. a default meeting point)
    pub fn manual(coordinate: LocalCoordinate, accuracy_meters: f64) -> Self {
        Self {
            coordinate,
            raw_coordinate: None,
            accuracy_meters,
            timestamp: Utc::now(),
            source_method: SourceMethod::ManualOverride,
            provenance: Provenance::default(),
        }
    }

    /// Classify this fix against `threshold_meters`
    pub fn classify(&self, threshold_meters: f64) -> FixClass {
        FixClass::from_accuracy(self.accuracy_meters, threshold_meters)
    }
}
