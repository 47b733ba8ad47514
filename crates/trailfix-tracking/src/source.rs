//! Position acquisition cascade
//!
//! [`PositionSource`] turns the device sensor and the optional secondary
//! provider into a single best-effort [`PositionFix`]:
//!
//! 1. device sensor, high accuracy, bounded timeout, short cache allowed
//! 2. on any failure, the secondary provider with its own timeout, plus a
//!    best-effort reverse lookup of a place description
//! 3. if both fail, one consolidated [`LocationError::Exhausted`]
//!
//! No default coordinate is ever substituted here. Choosing a fallback
//! position is the caller's decision (see [`PositionFix::manual`]).
//!
//! Timeouts are enforced by the providers; this module only passes the
//! configured value through.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use trailfix_core::{CoordinateTransformer, PositionFix, Provenance, SourceMethod};

use crate::config::SourceConfig;
use crate::error::{FailureReason, LocationError, LocationResult};
use crate::provider::{AcquireOptions, DeviceProvider, RawReading, SecondaryProvider};

/// Acquisition method exercised by [`PositionSource::diagnose`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticMethod {
    /// Regular device sensor read
    Primary,
    /// Uncached, high-accuracy device sensor read
    Forced,
    /// Secondary provider read
    Secondary,
}

/// Tagged result of one diagnostic method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodOutcome {
    /// The method produced a fix
    Success {
        /// The fix
        fix: PositionFix,
    },
    /// The method failed
    Failure {
        /// Coded reason
        reason: FailureReason,
        /// Error message
        message: String,
    },
}

impl MethodOutcome {
    /// The fix, if the method succeeded
    pub fn fix(&self) -> Option<&PositionFix> {
        match self {
            MethodOutcome::Success { fix } => Some(fix),
            MethodOutcome::Failure { .. } => None,
        }
    }

    /// Whether the method succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, MethodOutcome::Success { .. })
    }
}

impl From<LocationResult<PositionFix>> for MethodOutcome {
    fn from(result: LocationResult<PositionFix>) -> Self {
        match result {
            Ok(fix) => MethodOutcome::Success { fix },
            Err(e) => MethodOutcome::Failure {
                reason: e.reason(),
                message: e.to_string(),
            },
        }
    }
}

/// Side-by-side results of every acquisition method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Regular device sensor read
    pub primary: MethodOutcome,
    /// Forced device sensor read
    pub forced: MethodOutcome,
    /// Secondary provider read
    pub secondary: MethodOutcome,
}

impl DiagnosticsReport {
    /// Outcome for one method
    pub fn outcome(&self, method: DiagnosticMethod) -> &MethodOutcome {
        match method {
            DiagnosticMethod::Primary => &self.primary,
            DiagnosticMethod::Forced => &self.forced,
            DiagnosticMethod::Secondary => &self.secondary,
        }
    }

    /// Number of methods that produced a fix
    pub fn successes(&self) -> usize {
        [&self.primary, &self.forced, &self.secondary]
            .iter()
            .filter(|o| o.is_success())
            .count()
    }
}

/// Best-effort position acquisition over the configured providers
pub struct PositionSource {
    primary: Option<Arc<dyn DeviceProvider>>,
    secondary: Option<Arc<dyn SecondaryProvider>>,
    transformer: CoordinateTransformer,
    config: SourceConfig,
}

impl PositionSource {
    /// Create a source with no providers
    pub fn new(config: SourceConfig) -> Self {
        Self {
            primary: None,
            secondary: None,
            transformer: CoordinateTransformer::new(config.region_policy),
            config,
        }
    }

    /// Use `provider` as the device sensor
    pub fn with_primary(mut self, provider: Arc<dyn DeviceProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Use `provider` as the secondary provider
    pub fn with_secondary(mut self, provider: Arc<dyn SecondaryProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    /// The device sensor, if configured
    pub fn primary(&self) -> Option<&Arc<dyn DeviceProvider>> {
        self.primary.as_ref()
    }

    /// Source configuration
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Acquire one fix through the cascade
    pub async fn acquire(&self) -> LocationResult<PositionFix> {
        let primary_err = match self.read_primary(&self.config.primary_options()).await {
            Ok(fix) => return Ok(fix),
            Err(e) => e,
        };

        warn!(
            error = %primary_err,
            code = primary_err.error_code(),
            "Device sensor failed, trying secondary provider"
        );

        match self.read_secondary(&self.config.secondary_options()).await {
            Ok(fix) => Ok(fix),
            Err(secondary_err) => {
                let err = LocationError::exhausted(primary_err, secondary_err);
                warn!(reason = %err.reason(), "All position sources failed");
                Err(err)
            }
        }
    }

    /// Acquire a fresh, uncached, high-accuracy fix from the device sensor
    ///
    /// The fix carries the provider response time and a GPS-like /
    /// network-like classification.
    pub async fn acquire_forced(&self) -> LocationResult<PositionFix> {
        let options = self.config.forced_options();
        let started = Instant::now();
        let mut fix = self.read_primary(&options).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let class = fix.classify(self.config.gps_accuracy_threshold_m);
        fix.provenance.response_time_ms = Some(elapsed_ms);
        fix.provenance.classification = Some(class);

        info!(
            accuracy_m = fix.accuracy_meters,
            response_ms = elapsed_ms,
            class = ?class,
            "Forced fix acquired"
        );
        Ok(fix)
    }

    /// Run every acquisition method independently and report each outcome
    ///
    /// Never fails; each method's error is captured in its outcome.
    pub async fn diagnose(&self) -> DiagnosticsReport {
        let primary_options = self.config.primary_options();
        let secondary_options = self.config.secondary_options();

        let (primary, forced, secondary) = futures::join!(
            self.read_primary(&primary_options),
            self.acquire_forced(),
            self.read_secondary(&secondary_options),
        );

        let report = DiagnosticsReport {
            primary: primary.into(),
            forced: forced.into(),
            secondary: secondary.into(),
        };
        debug!(successes = report.successes(), "Location diagnostics complete");
        report
    }

    async fn read_primary(&self, options: &AcquireOptions) -> LocationResult<PositionFix> {
        let provider = self.primary.as_ref().ok_or_else(|| {
            LocationError::NotSupported("no device position sensor configured".to_string())
        })?;

        let started = Instant::now();
        let reading = provider.current_position(options).await?;
        debug!(
            provider = provider.name(),
            accuracy_m = reading.accuracy_meters,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Device sensor fix"
        );

        Ok(self.fix_from_raw(&reading))
    }

    async fn read_secondary(&self, options: &AcquireOptions) -> LocationResult<PositionFix> {
        let provider = self.secondary.as_ref().ok_or_else(|| {
            LocationError::ProviderUnavailable("no secondary provider configured".to_string())
        })?;

        let started = Instant::now();
        let reading = provider.locate(options).await?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let descriptor = match reading.address {
            Some(address) => Some(address),
            None => match provider.describe(&reading.coordinate).await {
                Ok(description) => Some(description),
                Err(e) => {
                    debug!(provider = provider.name(), error = %e, "Reverse lookup failed");
                    None
                }
            },
        };

        debug!(
            provider = provider.name(),
            accuracy_m = reading.accuracy_meters,
            elapsed_ms = response_time_ms,
            "Secondary provider fix"
        );

        Ok(PositionFix {
            coordinate: reading.coordinate,
            raw_coordinate: None,
            accuracy_meters: reading.accuracy_meters,
            timestamp: reading.timestamp,
            source_method: SourceMethod::SecondaryProvider,
            provenance: Provenance {
                response_time_ms: Some(response_time_ms),
                classification: None,
                descriptor,
            },
        })
    }

    fn fix_from_raw(&self, reading: &RawReading) -> PositionFix {
        PositionFix {
            coordinate: self.transformer.to_local_datum(&reading.coordinate),
            raw_coordinate: Some(reading.coordinate),
            accuracy_meters: reading.accuracy_meters,
            timestamp: reading.timestamp,
            source_method: SourceMethod::DeviceSensor,
            provenance: Provenance::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDeviceProvider, MockSecondaryProvider};
    use std::time::Duration;
    use trailfix_core::{FixClass, LocalCoordinate, RawCoordinate};

    fn beijing_raw() -> RawReading {
        RawReading::new(RawCoordinate::new(39.9042, 116.4074), 12.0)
    }

    fn secondary_reading(address: Option<&str>) -> crate::provider::SecondaryReading {
        crate::provider::SecondaryReading {
            coordinate: LocalCoordinate::new(39.9056, 116.4136),
            accuracy_meters: 40.0,
            timestamp: chrono::Utc::now(),
            address: address.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_primary_success_transforms_datum() {
        let device = Arc::new(MockDeviceProvider::new());
        device.queue_current(Ok(beijing_raw()));

        let source = PositionSource::new(SourceConfig::default()).with_primary(device.clone());
        let fix = source.acquire().await.unwrap();

        assert_eq!(fix.source_method, SourceMethod::DeviceSensor);
        assert_eq!(fix.raw_coordinate, Some(RawCoordinate::new(39.9042, 116.4074)));
        assert!((fix.coordinate.latitude - 39.905603343165).abs() < 1e-6);
        assert!((fix.coordinate.longitude - 116.413642253788).abs() < 1e-6);

        let options = device.requested_options();
        assert_eq!(options.len(), 1);
        assert!(options[0].enable_high_accuracy);
        assert_eq!(options[0].timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary() {
        let device = Arc::new(MockDeviceProvider::new());
        device.queue_current(Err(LocationError::Timeout { timeout_ms: 15_000 }));
        let secondary = Arc::new(MockSecondaryProvider::new());
        secondary.queue_locate(Ok(secondary_reading(None)));
        secondary.set_description(Ok("Tiananmen Square".to_string()));

        let source = PositionSource::new(SourceConfig::default())
            .with_primary(device)
            .with_secondary(secondary.clone());

        let fix = source.acquire().await.unwrap();
        assert_eq!(fix.source_method, SourceMethod::SecondaryProvider);
        assert!(fix.raw_coordinate.is_none());
        assert_eq!(fix.provenance.descriptor.as_deref(), Some("Tiananmen Square"));
        assert_eq!(secondary.requested_options()[0].timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_reverse_lookup_failure_does_not_fail_fix() {
        let device = Arc::new(MockDeviceProvider::new());
        device.queue_current(Err(LocationError::PositionUnavailable("indoors".to_string())));
        let secondary = Arc::new(MockSecondaryProvider::new());
        secondary.queue_locate(Ok(secondary_reading(None)));
        secondary.set_description(Err(LocationError::Timeout { timeout_ms: 3_000 }));

        let source = PositionSource::new(SourceConfig::default())
            .with_primary(device)
            .with_secondary(secondary);

        let fix = source.acquire().await.unwrap();
        assert!(fix.provenance.descriptor.is_none());
    }

    #[tokio::test]
    async fn test_address_from_reading_skips_lookup() {
        let secondary = Arc::new(MockSecondaryProvider::new());
        secondary.queue_locate(Ok(secondary_reading(Some("Dongcheng, Beijing"))));
        secondary.set_description(Ok("unused".to_string()));

        let source = PositionSource::new(SourceConfig::default()).with_secondary(secondary.clone());
        let fix = source.acquire().await.unwrap();

        assert_eq!(fix.provenance.descriptor.as_deref(), Some("Dongcheng, Beijing"));
        assert_eq!(secondary.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_both_fail_consolidates() {
        let device = Arc::new(MockDeviceProvider::new());
        device.queue_current(Err(LocationError::PermissionDenied));

        let source = PositionSource::new(SourceConfig::default()).with_primary(device);
        let err = source.acquire().await.unwrap_err();

        match &err {
            LocationError::Exhausted {
                dominant,
                primary,
                secondary,
            } => {
                assert_eq!(*dominant, FailureReason::PermissionDenied);
                assert_eq!(**primary, LocationError::PermissionDenied);
                assert_eq!(secondary.reason(), FailureReason::ProviderUnavailable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_providers_is_not_supported() {
        let source = PositionSource::new(SourceConfig::default());
        let err = source.acquire().await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::NotSupported);

        let err = source.acquire_forced().await.unwrap_err();
        assert_eq!(err, LocationError::NotSupported("no device position sensor configured".to_string()));
    }

    #[tokio::test]
    async fn test_forced_fix_classification() {
        let device = Arc::new(MockDeviceProvider::new());
        device.queue_current(Ok(beijing_raw()));
        device.queue_current(Ok(RawReading::new(RawCoordinate::new(39.9042, 116.4074), 650.0)));

        let source = PositionSource::new(SourceConfig::default()).with_primary(device.clone());

        let gps = source.acquire_forced().await.unwrap();
        assert_eq!(gps.provenance.classification, Some(FixClass::GpsLike));
        assert!(gps.provenance.response_time_ms.is_some());

        let network = source.acquire_forced().await.unwrap();
        assert_eq!(network.provenance.classification, Some(FixClass::NetworkLike));

        let options = device.requested_options();
        assert_eq!(options[0].maximum_age, Duration::ZERO);
        assert_eq!(options[0].timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_diagnose_captures_every_method() {
        let device = Arc::new(MockDeviceProvider::new());
        device.queue_current(Ok(beijing_raw()));
        device.queue_current(Err(LocationError::Timeout { timeout_ms: 30_000 }));

        let source = PositionSource::new(SourceConfig::default()).with_primary(device);
        let report = source.diagnose().await;

        // Which device read gets which queued answer depends on poll order,
        // so only the totals are checked for the two device methods.
        let device_successes = [DiagnosticMethod::Primary, DiagnosticMethod::Forced]
            .iter()
            .filter(|m| report.outcome(**m).is_success())
            .count();
        assert_eq!(device_successes, 1);
        assert_eq!(report.successes(), 1);

        match report.outcome(DiagnosticMethod::Secondary) {
            MethodOutcome::Failure { reason, .. } => {
                assert_eq!(*reason, FailureReason::ProviderUnavailable)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let outcome: MethodOutcome = Err(LocationError::PermissionDenied).into();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["reason"], "permission_denied");
        assert!(outcome.fix().is_none());
    }
}
