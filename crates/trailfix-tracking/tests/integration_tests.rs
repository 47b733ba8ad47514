//! Integration tests for acquisition and track recording
//!
//! These tests verify end-to-end behavior of the pipeline including:
//! - The device sensor / secondary provider cascade and its failures
//! - Forced reads and diagnostics
//! - Check-in evaluation on acquired fixes
//! - Recorder lifecycle, buffering, eviction and flush semantics

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trailfix_core::{
    Checkpoint, FixClass, GeofenceEvaluator, RawCoordinate, SourceMethod,
    EARTH_RADIUS_M,
};
use trailfix_tracking::test_utils::{walk_north, wait_until};
use trailfix_tracking::{
    DiagnosticMethod, FailureReason, FlushOutcome, LocationError, MockDeviceProvider,
    MockSecondaryProvider, MockUploader, PositionSource, RawReading, SecondaryReading,
    TrackRecorder, TrackSample, TrackingConfig, TrackingConfigBuilder, TrackingError, VERSION,
};

// ============================================================================
// Fixtures
// ============================================================================

const BEIJING: RawCoordinate = RawCoordinate::new(39.9042, 116.4074);

fn north_of(origin: RawCoordinate, meters: f64) -> RawCoordinate {
    RawCoordinate::new(
        origin.latitude + (meters / EARTH_RADIUS_M).to_degrees(),
        origin.longitude,
    )
}

fn beijing_checkpoint() -> Checkpoint {
    Checkpoint::new(1, BEIJING.to_local_datum(), 100.0).with_name("Start gate")
}

fn noop_sample() -> Arc<dyn Fn(&TrackSample) + Send + Sync> {
    Arc::new(|_: &TrackSample| {})
}

fn noop_error() -> Arc<dyn Fn(&LocationError) + Send + Sync> {
    Arc::new(|_: &LocationError| {})
}

struct RecorderFixture {
    device: Arc<MockDeviceProvider>,
    uploader: Arc<MockUploader>,
    recorder: Arc<TrackRecorder>,
}

impl RecorderFixture {
    fn new(config: TrackingConfig) -> Self {
        let device = Arc::new(MockDeviceProvider::new());
        let uploader = Arc::new(MockUploader::new());
        let recorder = Arc::new(TrackRecorder::new(
            42,
            device.clone(),
            uploader.clone(),
            config,
        ));
        Self {
            device,
            uploader,
            recorder,
        }
    }

    async fn push_walk(&self, readings: Vec<RawReading>) {
        let tx = self.device.watcher().expect("watch not opened");
        for reading in readings {
            assert!(tx.push(Ok(reading)).await);
        }
    }
}

// ============================================================================
// Acquisition
// ============================================================================

#[tokio::test]
async fn test_check_in_with_device_fix() {
    let checkpoint = beijing_checkpoint();

    let device = Arc::new(MockDeviceProvider::new());
    device.queue_current(Ok(RawReading::new(north_of(BEIJING, 95.0), 8.0)));
    device.queue_current(Ok(RawReading::new(north_of(BEIJING, 105.0), 8.0)));

    let source = PositionSource::new(TrackingConfig::default().source).with_primary(device);

    let near = source.acquire().await.unwrap();
    let result = GeofenceEvaluator::evaluate(&near, &checkpoint);
    assert!(result.in_range);
    assert!((94..=96).contains(&result.distance_meters));

    let far = source.acquire().await.unwrap();
    let result = GeofenceEvaluator::evaluate(&far, &checkpoint);
    assert!(!result.in_range);
    assert!((104..=106).contains(&result.distance_meters));
}

#[tokio::test]
async fn test_check_in_with_secondary_fallback() {
    let checkpoint = beijing_checkpoint();

    let device = Arc::new(MockDeviceProvider::new());
    device.queue_current(Err(LocationError::Timeout { timeout_ms: 15_000 }));

    let secondary = Arc::new(MockSecondaryProvider::new());
    secondary.queue_locate(Ok(SecondaryReading {
        coordinate: checkpoint.coordinate,
        accuracy_meters: 35.0,
        timestamp: chrono::Utc::now(),
        address: Some("Dongcheng, Beijing".to_string()),
    }));

    let source = PositionSource::new(TrackingConfig::default().source)
        .with_primary(device)
        .with_secondary(secondary);

    let fix = source.acquire().await.unwrap();
    assert_eq!(fix.source_method, SourceMethod::SecondaryProvider);

    let result = GeofenceEvaluator::evaluate(&fix, &checkpoint);
    assert!(result.in_range);
    assert_eq!(result.distance_meters, 0);
}

#[tokio::test]
async fn test_consolidated_failure_keeps_both_causes() {
    let device = Arc::new(MockDeviceProvider::new());
    device.queue_current(Err(LocationError::PositionUnavailable("indoors".to_string())));
    let secondary = Arc::new(MockSecondaryProvider::new());
    secondary.queue_locate(Err(LocationError::PermissionDenied));

    let source = PositionSource::new(TrackingConfig::default().source)
        .with_primary(device)
        .with_secondary(secondary);

    let err = source.acquire().await.unwrap_err();
    assert_eq!(err.reason(), FailureReason::PermissionDenied);
    assert_eq!(err.error_code(), "ALL_SOURCES_FAILED");

    let message = err.to_string();
    assert!(message.contains("indoors"));
    assert!(message.contains("permission denied"));
}

#[tokio::test]
async fn test_forced_read_respects_configured_threshold() {
    let device = Arc::new(MockDeviceProvider::new());
    device.queue_current(Ok(RawReading::new(BEIJING, 60.0)));

    let config = TrackingConfigBuilder::new().gps_accuracy_threshold(50.0).build();
    let source = PositionSource::new(config.source).with_primary(device);

    let fix = source.acquire_forced().await.unwrap();
    assert_eq!(fix.provenance.classification, Some(FixClass::NetworkLike));
}

#[tokio::test]
async fn test_diagnostics_never_fail() {
    let source = PositionSource::new(TrackingConfig::default().source);
    let report = source.diagnose().await;

    assert_eq!(report.successes(), 0);
    for method in [
        DiagnosticMethod::Primary,
        DiagnosticMethod::Forced,
        DiagnosticMethod::Secondary,
    ] {
        assert!(!report.outcome(method).is_success());
    }

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["primary"]["reason"], "not_supported");
    assert_eq!(json["secondary"]["reason"], "provider_unavailable");
}

// ============================================================================
// Recorder lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_twice_opens_one_watch() {
    let fx = RecorderFixture::new(TrackingConfig::default());

    fx.recorder.start(noop_sample(), noop_error()).unwrap();
    let session = fx.recorder.session_id();
    fx.recorder.start(noop_sample(), noop_error()).unwrap();

    assert_eq!(fx.device.watch_calls(), 1);
    assert_eq!(fx.recorder.session_id(), session);

    let options = fx.device.watch_options();
    assert!(options[0].enable_high_accuracy);
    assert_eq!(options[0].maximum_age, Duration::ZERO);

    fx.recorder.stop().await.unwrap();
}

#[tokio::test]
async fn test_no_samples_after_stop() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    fx.recorder.start(noop_sample(), noop_error()).unwrap();

    fx.push_walk(walk_north(BEIJING, 3, 10.0)).await;
    let tx = fx.device.watcher().unwrap();

    let outcome = fx.recorder.stop().await.unwrap();
    assert_eq!(
        outcome,
        Some(FlushOutcome::Uploaded {
            sent: 3,
            removed: 3
        })
    );
    assert!(!fx.recorder.is_recording());

    assert!(!tx.push(Ok(RawReading::new(BEIJING, 5.0))).await);
    tokio::task::yield_now().await;
    assert!(fx.recorder.is_empty());
    assert_eq!(fx.recorder.stats().samples_received, 3);

    assert!(fx.recorder.stop().await.unwrap().is_none());
}

#[tokio::test]
async fn test_restart_clears_buffer() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    fx.uploader.fail_with(Some("offline"));

    fx.recorder.start(noop_sample(), noop_error()).unwrap();
    fx.push_walk(walk_north(BEIJING, 2, 10.0)).await;
    assert!(fx.recorder.stop().await.is_err());
    assert_eq!(fx.recorder.len(), 2);

    fx.recorder.start(noop_sample(), noop_error()).unwrap();
    assert!(fx.recorder.is_empty());
    assert_eq!(fx.device.watch_calls(), 2);
    fx.uploader.fail_with(None);
    assert_eq!(fx.recorder.stop().await.unwrap(), Some(FlushOutcome::Empty));
}

#[tokio::test]
async fn test_errors_forwarded_without_stopping() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = errors.clone();

    fx.recorder
        .start(
            noop_sample(),
            Arc::new(move |err: &LocationError| {
                assert_eq!(err.reason(), FailureReason::PositionUnavailable);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    let tx = fx.device.watcher().unwrap();
    assert!(tx
        .push(Err(LocationError::PositionUnavailable("tunnel".to_string())))
        .await);
    assert!(tx.push(Ok(RawReading::new(BEIJING, 5.0))).await);

    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 1).await;

    assert!(fx.recorder.is_recording());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(fx.recorder.stats().errors_forwarded, 1);

    fx.recorder.stop().await.unwrap();
}

#[tokio::test]
async fn test_samples_forwarded_in_order() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();

    fx.recorder
        .start(
            Arc::new(move |sample: &TrackSample| {
                sink.lock().push(sample.raw_coordinate.latitude);
            }),
            noop_error(),
        )
        .unwrap();

    let walk = walk_north(BEIJING, 5, 20.0);
    let expected: Vec<f64> = walk.iter().map(|r| r.coordinate.latitude).collect();
    fx.push_walk(walk).await;
    fx.recorder.stop().await.unwrap();

    assert_eq!(*seen.lock(), expected);
}

// ============================================================================
// Buffering and flush
// ============================================================================

#[tokio::test]
async fn test_buffer_cap_drops_oldest() {
    let config = TrackingConfigBuilder::new().max_samples(3).build();
    let fx = RecorderFixture::new(config);
    fx.recorder.start(noop_sample(), noop_error()).unwrap();

    let walk = walk_north(BEIJING, 5, 10.0);
    let expected: Vec<RawCoordinate> = walk[2..].iter().map(|r| r.coordinate).collect();
    fx.push_walk(walk).await;

    let recorder = fx.recorder.clone();
    wait_until(move || recorder.stats().samples_received == 5).await;

    let kept: Vec<RawCoordinate> = fx
        .recorder
        .tracks()
        .iter()
        .map(|s| s.raw_coordinate)
        .collect();
    assert_eq!(kept, expected);
    assert_eq!(fx.recorder.stats().samples_evicted, 2);

    fx.recorder.stop().await.unwrap();
}

#[tokio::test]
async fn test_flush_success_keeps_samples_recorded_during_upload() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    fx.recorder.start(noop_sample(), noop_error()).unwrap();

    let walk = walk_north(BEIJING, 3, 10.0);
    let late = walk[2].coordinate;
    fx.push_walk(walk[..2].to_vec()).await;
    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 2).await;

    let gate = fx.uploader.hold_next();
    let recorder = fx.recorder.clone();
    let flush = tokio::spawn(async move { recorder.flush().await });

    gate.entered().await;
    fx.push_walk(walk[2..].to_vec()).await;
    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 3).await;
    gate.release();

    let outcome = flush.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        FlushOutcome::Uploaded {
            sent: 2,
            removed: 2
        }
    );

    let remaining = fx.recorder.tracks();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].raw_coordinate, late);

    fx.recorder.stop().await.unwrap();
}

#[tokio::test]
async fn test_flush_failure_keeps_everything() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    fx.recorder.start(noop_sample(), noop_error()).unwrap();

    let walk = walk_north(BEIJING, 3, 10.0);
    fx.push_walk(walk[..2].to_vec()).await;
    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 2).await;

    fx.uploader.fail_with(Some("503 Service Unavailable"));
    let gate = fx.uploader.hold_next();
    let recorder = fx.recorder.clone();
    let flush = tokio::spawn(async move { recorder.flush().await });

    gate.entered().await;
    fx.push_walk(walk[2..].to_vec()).await;
    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 3).await;
    gate.release();

    match flush.await.unwrap() {
        Err(TrackingError::UploadFailed { count, reason }) => {
            assert_eq!(count, 2);
            assert!(reason.contains("503"));
        }
        other => panic!("unexpected flush result: {other:?}"),
    }
    assert_eq!(fx.recorder.len(), 3);

    // Retry sends the failed samples again together with the new one
    fx.uploader.fail_with(None);
    assert_eq!(
        fx.recorder.flush().await.unwrap(),
        FlushOutcome::Uploaded {
            sent: 3,
            removed: 3
        }
    );
    let batches = fx.uploader.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].records[..2], batches[0].records[..]);
    assert_eq!(batches[1].activity_id, 42);

    let stats = fx.recorder.stats();
    assert_eq!(stats.flushes_failed, 1);
    assert_eq!(stats.flushes_succeeded, 1);

    fx.recorder.stop().await.unwrap();
}

#[tokio::test]
async fn test_flush_empty_is_noop() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    assert_eq!(fx.recorder.flush().await.unwrap(), FlushOutcome::Empty);
    assert_eq!(fx.uploader.upload_count(), 0);
}

#[tokio::test]
async fn test_flush_with_other_uploader() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    fx.recorder.start(noop_sample(), noop_error()).unwrap();
    fx.push_walk(walk_north(BEIJING, 2, 10.0)).await;
    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 2).await;

    let other = MockUploader::new();
    fx.recorder.flush_with(&other).await.unwrap();
    assert_eq!(other.upload_count(), 1);
    assert_eq!(fx.uploader.upload_count(), 0);
    assert!(fx.recorder.is_empty());

    fx.recorder.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_flush() {
    let config = TrackingConfigBuilder::new()
        .flush_interval(Duration::from_secs(30))
        .build();
    let fx = RecorderFixture::new(config);
    fx.recorder.start(noop_sample(), noop_error()).unwrap();

    fx.push_walk(walk_north(BEIJING, 4, 10.0)).await;
    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 4).await;
    assert_eq!(fx.uploader.upload_count(), 0);

    tokio::time::advance(Duration::from_secs(30)).await;
    let uploader = fx.uploader.clone();
    wait_until(move || uploader.upload_count() == 1).await;

    let recorder = fx.recorder.clone();
    wait_until(move || recorder.is_empty()).await;
    assert_eq!(fx.uploader.batches()[0].len(), 4);

    fx.recorder.stop().await.unwrap();
}

#[tokio::test]
async fn test_total_distance_over_buffer() {
    let fx = RecorderFixture::new(TrackingConfig::default());
    fx.recorder.start(noop_sample(), noop_error()).unwrap();

    fx.push_walk(walk_north(BEIJING, 11, 10.0)).await;
    let recorder = fx.recorder.clone();
    wait_until(move || recorder.len() == 11).await;

    let distance = fx.recorder.total_distance_meters();
    assert!((distance - 100.0).abs() < 1.0, "distance was {distance}");

    fx.recorder.stop().await.unwrap();
}

#[test]
fn test_version_info() {
    assert!(!VERSION.is_empty());
}
