//! Track replay through the recorder
//!
//! A recorded track file is fed through a [`ReplayProvider`] that behaves
//! like a device sensor watch, and batches are "uploaded" by printing them.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use trailfix_core::RawCoordinate;
use trailfix_tracking::{
    AcquireOptions, DeviceProvider, LocationError, LocationResult, RawReading, Subscription,
    TrackBatch, TrackUploader,
};

const REPLAY_CHANNEL_CAPACITY: usize = 64;

fn default_accuracy() -> f64 {
    10.0
}

/// One point of a recorded track file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayPoint {
    /// WGS84 latitude
    pub latitude: f64,
    /// WGS84 longitude
    pub longitude: f64,
    /// Accuracy radius in meters
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
    /// Ground speed in m/s
    #[serde(default)]
    pub speed: Option<f64>,
    /// When the point was recorded; replay time if absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReplayPoint {
    fn into_reading(self) -> RawReading {
        let mut reading =
            RawReading::new(RawCoordinate::new(self.latitude, self.longitude), self.accuracy);
        reading.speed = self.speed;
        if let Some(timestamp) = self.timestamp {
            reading = reading.at(timestamp);
        }
        reading
    }
}

/// Parse a JSON array of track points
pub fn parse_track(json: &str) -> anyhow::Result<Vec<RawReading>> {
    let points: Vec<ReplayPoint> = serde_json::from_str(json)?;
    let readings: Vec<RawReading> = points.into_iter().map(ReplayPoint::into_reading).collect();

    if let Some(bad) = readings.iter().position(|r| !r.coordinate.is_valid()) {
        anyhow::bail!("track point {} is not a valid coordinate", bad);
    }
    Ok(readings)
}

/// Load a track file
pub fn load_track(path: &Path) -> anyhow::Result<Vec<RawReading>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading track file {}", path.display()))?;
    parse_track(&json).with_context(|| format!("parsing track file {}", path.display()))
}

/// Device provider that plays back a recorded track
pub struct ReplayProvider {
    readings: Vec<RawReading>,
    step_delay: Duration,
    feeder: Mutex<Option<JoinHandle<usize>>>,
}

impl ReplayProvider {
    /// Play `readings` back, waiting `step_delay` before each one
    pub fn new(readings: Vec<RawReading>, step_delay: Duration) -> Self {
        Self {
            readings,
            step_delay,
            feeder: Mutex::new(None),
        }
    }

    /// Wait until the watch has delivered every reading
    ///
    /// Returns the number of readings delivered, 0 if no watch was opened.
    pub async fn finished(&self) -> anyhow::Result<usize> {
        let feeder = self.feeder.lock().take();
        match feeder {
            Some(handle) => Ok(handle.await?),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl DeviceProvider for ReplayProvider {
    async fn current_position(&self, _options: &AcquireOptions) -> LocationResult<RawReading> {
        self.readings
            .first()
            .cloned()
            .ok_or_else(|| LocationError::PositionUnavailable("track is empty".to_string()))
    }

    fn watch_position(&self, _options: &AcquireOptions) -> LocationResult<Subscription> {
        let (tx, subscription) = Subscription::channel(REPLAY_CHANNEL_CAPACITY);
        let readings = self.readings.clone();
        let step_delay = self.step_delay;

        let handle = tokio::spawn(async move {
            let mut sent = 0;
            for reading in readings {
                if !step_delay.is_zero() {
                    tokio::time::sleep(step_delay).await;
                }
                if !tx.push(Ok(reading)).await {
                    debug!(sent, "Replay watch cancelled");
                    break;
                }
                sent += 1;
            }
            sent
        });

        *self.feeder.lock() = Some(handle);
        Ok(subscription)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Uploader that prints every batch as one line of JSON
#[derive(Debug, Default)]
pub struct LogUploader;

#[async_trait]
impl TrackUploader for LogUploader {
    async fn upload(&self, batch: &TrackBatch) -> std::result::Result<(), String> {
        let json = serde_json::to_string(batch).map_err(|e| e.to_string())?;
        println!("{}", json);
        info!(
            activity_id = batch.activity_id,
            records = batch.len(),
            "Uploaded track batch"
        );
        Ok(())
    }
}
