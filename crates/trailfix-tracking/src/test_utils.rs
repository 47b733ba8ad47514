//! Test utilities for exercising the pipeline without real providers
//!
//! This module provides scripted position providers and a recording
//! uploader so acquisition and recording can be tested deterministically.
//!
//! # Example
//!
//! ```rust,ignore
//! use trailfix_tracking::test_utils::{MockDeviceProvider, MockUploader};
//!
//! #[tokio::test]
//! async fn test_recording() {
//!     let device = Arc::new(MockDeviceProvider::new());
//!     let uploader = Arc::new(MockUploader::new());
//!     let recorder = TrackRecorder::new(1, device.clone(), uploader.clone(), Default::default());
//!
//!     recorder.start(Arc::new(|_| {}), Arc::new(|_| {})).unwrap();
//!     device.watcher().unwrap().push(Ok(reading)).await;
//! }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use trailfix_core::{LocalCoordinate, RawCoordinate, EARTH_RADIUS_M};

use crate::error::{LocationError, LocationResult};
use crate::provider::{
    AcquireOptions, DeviceProvider, RawReading, SecondaryProvider, SecondaryReading, Subscription,
    WatchSender,
};
use crate::upload::{TrackBatch, TrackUploader};

const MOCK_WATCH_CAPACITY: usize = 64;

/// Scripted device sensor
///
/// One-shot reads pop from a queue; an empty queue answers
/// `PositionUnavailable`. A watch hands its sender to the test through
/// [`watcher`](Self::watcher).
#[derive(Debug, Default)]
pub struct MockDeviceProvider {
    current: Mutex<VecDeque<LocationResult<RawReading>>>,
    requested: Mutex<Vec<AcquireOptions>>,
    watch_error: Mutex<Option<LocationError>>,
    watcher: Mutex<Option<WatchSender>>,
    watch_options: Mutex<Vec<AcquireOptions>>,
    watch_calls: AtomicUsize,
}

impl MockDeviceProvider {
    /// Create a new mock sensor
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next one-shot read
    pub fn queue_current(&self, result: LocationResult<RawReading>) {
        self.current.lock().push_back(result);
    }

    /// Make every following watch request fail
    pub fn fail_watch(&self, err: LocationError) {
        *self.watch_error.lock() = Some(err);
    }

    /// Options passed to each one-shot read, in call order
    pub fn requested_options(&self) -> Vec<AcquireOptions> {
        self.requested.lock().clone()
    }

    /// Options passed to each watch request, in call order
    pub fn watch_options(&self) -> Vec<AcquireOptions> {
        self.watch_options.lock().clone()
    }

    /// Number of watch requests
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Sender of the most recently opened watch
    pub fn watcher(&self) -> Option<WatchSender> {
        self.watcher.lock().clone()
    }

    /// Drop the held sender so the watch ends once every clone is gone
    pub fn close_watch(&self) {
        self.watcher.lock().take();
    }
}

#[async_trait]
impl DeviceProvider for MockDeviceProvider {
    async fn current_position(&self, options: &AcquireOptions) -> LocationResult<RawReading> {
        self.requested.lock().push(*options);
        self.current.lock().pop_front().unwrap_or_else(|| {
            Err(LocationError::PositionUnavailable(
                "no scripted reading".to_string(),
            ))
        })
    }

    fn watch_position(&self, options: &AcquireOptions) -> LocationResult<Subscription> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        self.watch_options.lock().push(*options);
        if let Some(err) = self.watch_error.lock().clone() {
            return Err(err);
        }

        let (tx, subscription) = Subscription::channel(MOCK_WATCH_CAPACITY);
        *self.watcher.lock() = Some(tx);
        Ok(subscription)
    }

    fn name(&self) -> &str {
        "MockDeviceProvider"
    }
}

/// Scripted secondary provider
#[derive(Debug, Default)]
pub struct MockSecondaryProvider {
    locate: Mutex<VecDeque<LocationResult<SecondaryReading>>>,
    description: Mutex<Option<LocationResult<String>>>,
    requested: Mutex<Vec<AcquireOptions>>,
    describe_calls: AtomicUsize,
}

impl MockSecondaryProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next locate call
    pub fn queue_locate(&self, result: LocationResult<SecondaryReading>) {
        self.locate.lock().push_back(result);
    }

    /// Set the answer to every reverse lookup
    pub fn set_description(&self, result: LocationResult<String>) {
        *self.description.lock() = Some(result);
    }

    /// Options passed to each locate call
    pub fn requested_options(&self) -> Vec<AcquireOptions> {
        self.requested.lock().clone()
    }

    /// Number of reverse lookups
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecondaryProvider for MockSecondaryProvider {
    async fn locate(&self, options: &AcquireOptions) -> LocationResult<SecondaryReading> {
        self.requested.lock().push(*options);
        self.locate.lock().pop_front().unwrap_or_else(|| {
            Err(LocationError::ProviderUnavailable(
                "map SDK not loaded".to_string(),
            ))
        })
    }

    async fn describe(&self, _coordinate: &LocalCoordinate) -> LocationResult<String> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.description
            .lock()
            .clone()
            .unwrap_or_else(|| Err(LocationError::NotSupported("no reverse lookup".to_string())))
    }

    fn name(&self) -> &str {
        "MockSecondaryProvider"
    }
}

/// Holds one upload in flight until released
#[derive(Debug, Default)]
pub struct UploadGate {
    entered: Notify,
    release: Notify,
}

impl UploadGate {
    /// Wait until the held upload has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held upload finish
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Uploader that records every batch it is given
#[derive(Debug, Default)]
pub struct MockUploader {
    batches: Mutex<Vec<TrackBatch>>,
    failure: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<UploadGate>>>,
}

impl MockUploader {
    /// Create an uploader that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads with `reason` until cleared with `None`
    pub fn fail_with(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    /// Hold the next upload in flight until the returned gate is released
    pub fn hold_next(&self) -> Arc<UploadGate> {
        let gate = Arc::new(UploadGate::default());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Every batch passed to `upload`, accepted or not
    pub fn batches(&self) -> Vec<TrackBatch> {
        self.batches.lock().clone()
    }

    /// Number of upload attempts
    pub fn upload_count(&self) -> usize {
        self.batches.lock().len()
    }
}

#[async_trait]
impl TrackUploader for MockUploader {
    async fn upload(&self, batch: &TrackBatch) -> std::result::Result<(), String> {
        self.batches.lock().push(batch.clone());

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        match self.failure.lock().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

/// Readings walking due north from `start`, `step_meters` apart, one second apart
pub fn walk_north(start: RawCoordinate, steps: usize, step_meters: f64) -> Vec<RawReading> {
    let step_degrees = (step_meters / EARTH_RADIUS_M).to_degrees();
    let t0 = chrono::Utc::now();
    (0..steps)
        .map(|i| {
            let coordinate =
                RawCoordinate::new(start.latitude + step_degrees * i as f64, start.longitude);
            RawReading::new(coordinate, 5.0).at(t0 + chrono::Duration::seconds(i as i64))
        })
        .collect()
}

/// Poll `condition` until it holds, panicking after a bounded number of tries
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_device_queue() {
        let device = MockDeviceProvider::new();
        let options = AcquireOptions {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(1),
            maximum_age: Duration::ZERO,
        };

        device.queue_current(Err(LocationError::PermissionDenied));
        assert_eq!(
            device.current_position(&options).await.unwrap_err(),
            LocationError::PermissionDenied
        );
        assert!(device.current_position(&options).await.is_err());
        assert_eq!(device.requested_options().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_uploader_failure_toggle() {
        let uploader = MockUploader::new();
        let batch = TrackBatch::from_samples(1, &[]);

        uploader.fail_with(Some("503"));
        assert_eq!(uploader.upload(&batch).await, Err("503".to_string()));
        uploader.fail_with(None);
        assert!(uploader.upload(&batch).await.is_ok());
        assert_eq!(uploader.upload_count(), 2);
    }

    #[test]
    fn test_walk_north_spacing() {
        let readings = walk_north(RawCoordinate::new(30.0, 120.0), 3, 10.0);
        assert_eq!(readings.len(), 3);
        let d = trailfix_core::distance_meters(&readings[0].coordinate, &readings[1].coordinate);
        assert!((d - 10.0).abs() < 1e-6);
        assert!(readings[1].timestamp > readings[0].timestamp);
    }
}
