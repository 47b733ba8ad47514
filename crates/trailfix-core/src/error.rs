//! Error types for the geometry core
//!
//! The datum transform and distance math are total; errors only come from
//! validating and loading externally supplied data.

use thiserror::Error;

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===== Input Errors =====
    /// Latitude or longitude out of range
    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Negative or non-finite radius
    #[error("Invalid geofence radius: {0}")]
    InvalidRadius(f64),

    // ===== Serialization Errors =====
    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== General Errors =====
    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Check if this error is a client error (bad input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidCoordinate { .. }
                | CoreError::InvalidRadius(_)
                | CoreError::Serialization(_)
        )
    }

    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            CoreError::InvalidRadius(_) => "INVALID_RADIUS",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
