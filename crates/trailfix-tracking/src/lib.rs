//! Position acquisition and track recording for outdoor activities
//!
//! This crate drives the platform's position providers on top of the pure
//! geometry in `trailfix-core`.
//!
//! # Architecture
//!
//! The pipeline operates in three layers:
//!
//! 1. **Providers** - device sensor and secondary map provider behind traits
//! 2. **Acquisition** - [`PositionSource`] cascade, forced reads, diagnostics
//! 3. **Recording** - [`TrackRecorder`] sessions with a bounded buffer and
//!    periodic upload
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trailfix_core::GeofenceEvaluator;
//! use trailfix_tracking::{PositionSource, TrackRecorder, TrackingConfig};
//!
//! let config = TrackingConfig::default();
//!
//! // On-demand check-in
//! let source = PositionSource::new(config.source.clone())
//!     .with_primary(device.clone())
//!     .with_secondary(map_sdk);
//! let fix = source.acquire().await?;
//! let result = GeofenceEvaluator::evaluate(&fix, &checkpoint);
//!
//! // Background track
//! let recorder = TrackRecorder::new(activity_id, device, uploader, config);
//! recorder.start(Arc::new(|_| {}), Arc::new(|_| {}))?;
//! ```
//!
//! # Delivery
//!
//! Track uploads are at-least-once: a failed flush keeps its samples for the
//! next attempt, and samples recorded while an upload is in flight are never
//! dropped by it.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod provider;

pub mod buffer;
pub mod source;
pub mod upload;

pub mod recorder;

pub mod test_utils;

pub use config::{RecorderConfig, SourceConfig, TrackingConfig, TrackingConfigBuilder};
pub use error::{FailureReason, LocationError, LocationResult, Result, TrackingError};
pub use provider::{
    AcquireOptions, DeviceProvider, RawReading, SecondaryProvider, SecondaryReading, Subscription,
    WatchEvent, WatchSender,
};

pub use buffer::{SampleBuffer, Snapshot, TrackSample};
pub use source::{DiagnosticMethod, DiagnosticsReport, MethodOutcome, PositionSource};
pub use upload::{FlushOutcome, TrackBatch, TrackUploader, UploadRecord};

pub use recorder::{ErrorCallback, RecorderStats, SampleCallback, TrackRecorder};

pub use test_utils::{MockDeviceProvider, MockSecondaryProvider, MockUploader, UploadGate};

pub use config::{
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_FORCED_TIMEOUT_MS, DEFAULT_MAX_SAMPLES,
    DEFAULT_PRIMARY_MAX_AGE_MS, DEFAULT_PRIMARY_TIMEOUT_MS, DEFAULT_SECONDARY_TIMEOUT_MS,
    DEFAULT_WATCH_TIMEOUT_MS,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
