//! Error types for position acquisition and track recording
//!
//! Acquisition failures carry a coded [`FailureReason`] so the UI layer can
//! give actionable guidance (e.g. "enable location permission"). Upload
//! failures are transient; the recorder keeps its buffer when one occurs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coded reason behind an acquisition failure
///
/// Variants are declared from most to least actionable; the derived `Ord`
/// is used to pick the dominant reason when every source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The user or platform refused location access
    PermissionDenied,
    /// The provider did not answer within its timeout
    Timeout,
    /// The provider could not determine a position
    PositionUnavailable,
    /// The platform has no position API at all
    NotSupported,
    /// An optional provider is not loaded/configured
    ProviderUnavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PermissionDenied => write!(f, "permission_denied"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::PositionUnavailable => write!(f, "position_unavailable"),
            FailureReason::NotSupported => write!(f, "not_supported"),
            FailureReason::ProviderUnavailable => write!(f, "provider_unavailable"),
        }
    }
}

const WATCH_CLOSED: &str = "watch closed by provider";

/// Failure to obtain a position
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    /// Location permission refused
    #[error("Location permission denied")]
    PermissionDenied,

    /// Position could not be determined
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// Provider timed out
    #[error("Location request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that was passed to the provider
        timeout_ms: u64,
    },

    /// No position API on this platform
    #[error("Geolocation not supported: {0}")]
    NotSupported(String),

    /// Optional provider not available
    #[error("Position provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Every source in the cascade failed
    #[error("All position sources failed ({dominant}): primary: {primary}; secondary: {secondary}")]
    Exhausted {
        /// Reason that dominated across the attempts
        dominant: FailureReason,
        /// Device sensor failure
        primary: Box<LocationError>,
        /// Secondary provider failure
        secondary: Box<LocationError>,
    },
}

impl LocationError {
    /// Coded reason for this failure
    pub fn reason(&self) -> FailureReason {
        match self {
            LocationError::PermissionDenied => FailureReason::PermissionDenied,
            LocationError::PositionUnavailable(_) => FailureReason::PositionUnavailable,
            LocationError::Timeout { .. } => FailureReason::Timeout,
            LocationError::NotSupported(_) => FailureReason::NotSupported,
            LocationError::ProviderUnavailable(_) => FailureReason::ProviderUnavailable,
            LocationError::Exhausted { dominant, .. } => *dominant,
        }
    }

    /// Combine the failures of both cascade steps into one
    pub fn exhausted(primary: LocationError, secondary: LocationError) -> Self {
        let dominant = primary.reason().min(secondary.reason());
        LocationError::Exhausted {
            dominant,
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        }
    }

    /// Watch stream ended by the provider
    pub fn watch_closed() -> Self {
        LocationError::PositionUnavailable(WATCH_CLOSED.to_string())
    }

    /// True for the error sent when the provider ends a watch
    pub fn is_watch_closed(&self) -> bool {
        matches!(self, LocationError::PositionUnavailable(msg) if msg == WATCH_CLOSED)
    }

    /// Check if retrying the request may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.reason(),
            FailureReason::Timeout | FailureReason::PositionUnavailable
        )
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => "PERMISSION_DENIED",
            LocationError::PositionUnavailable(_) => "POSITION_UNAVAILABLE",
            LocationError::Timeout { .. } => "TIMEOUT",
            LocationError::NotSupported(_) => "NOT_SUPPORTED",
            LocationError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            LocationError::Exhausted { .. } => "ALL_SOURCES_FAILED",
        }
    }
}

/// Main error type for the tracking pipeline
#[derive(Error, Debug)]
pub enum TrackingError {
    /// Position acquisition failed
    #[error(transparent)]
    Location(#[from] LocationError),

    /// Upload collaborator rejected a batch
    #[error("Upload of {count} samples failed: {reason}")]
    UploadFailed {
        /// Samples in the rejected batch
        count: usize,
        /// Failure reason reported by the uploader
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackingError {
    /// Check if this error is recoverable/retriable
    pub fn is_retriable(&self) -> bool {
        match self {
            TrackingError::Location(e) => e.is_retriable(),
            TrackingError::UploadFailed { .. } => true,
            _ => false,
        }
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            TrackingError::Location(e) => e.error_code(),
            TrackingError::UploadFailed { .. } => "UPLOAD_FAILED",
            TrackingError::InvalidConfig(_) => "INVALID_CONFIG",
            TrackingError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for acquisition
pub type LocationResult<T> = std::result::Result<T, LocationError>;

/// Result type alias for tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;

impl From<tokio::task::JoinError> for TrackingError {
    fn from(err: tokio::task::JoinError) -> Self {
        TrackingError::Internal(err.to_string())
    }
}
