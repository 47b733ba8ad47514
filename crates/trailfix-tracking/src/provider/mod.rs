//! Position provider interfaces
//!
//! The platform's position APIs are consumed through two traits:
//!
//! - [`DeviceProvider`] - the device position sensor, reporting raw WGS84
//!   readings, with one-shot reads and a continuous watch
//! - [`SecondaryProvider`] - a slower map-SDK provider that already reports
//!   in the local datum and can describe a position in words
//!
//! A continuous watch is a [`Subscription`]: the provider pushes readings
//! into a channel through a [`WatchSender`] and the consumer cancels the
//! subscription explicitly when done.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use trailfix_core::{LocalCoordinate, RawCoordinate};

use crate::error::{LocationError, LocationResult};

/// Options passed through to a provider for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Ask for the most accurate position the platform can give
    pub enable_high_accuracy: bool,
    /// Provider-enforced timeout
    pub timeout: Duration,
    /// Oldest cached reading the provider may return (zero disables caching)
    pub maximum_age: Duration,
}

impl AcquireOptions {
    /// Timeout in whole milliseconds, as carried by timeout errors
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// One reading from the device sensor, in WGS84
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Reported position
    pub coordinate: RawCoordinate,
    /// Accuracy radius in meters
    pub accuracy_meters: f64,
    /// Altitude in meters, if reported
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Heading in degrees from true north, if reported
    #[serde(default)]
    pub heading: Option<f64>,
    /// Ground speed in m/s, if reported
    #[serde(default)]
    pub speed: Option<f64>,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl RawReading {
    /// Reading at `coordinate` taken now
    pub fn new(coordinate: RawCoordinate, accuracy_meters: f64) -> Self {
        Self {
            coordinate,
            accuracy_meters,
            altitude: None,
            heading: None,
            speed: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the ground speed
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Set the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// One reading from the secondary provider, already in GCJ02
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryReading {
    /// Reported position
    pub coordinate: LocalCoordinate,
    /// Accuracy radius in meters
    pub accuracy_meters: f64,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Formatted address, when the provider returned one with the fix
    #[serde(default)]
    pub address: Option<String>,
}

/// Device position sensor
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Read the current position once
    async fn current_position(&self, options: &AcquireOptions) -> LocationResult<RawReading>;

    /// Open a continuous watch; readings and errors are pushed as they occur
    fn watch_position(&self, options: &AcquireOptions) -> LocationResult<Subscription>;

    /// Get the provider name (for logging)
    fn name(&self) -> &str;
}

/// Secondary, higher-latency position provider
#[async_trait]
pub trait SecondaryProvider: Send + Sync {
    /// Read the current position once
    async fn locate(&self, options: &AcquireOptions) -> LocationResult<SecondaryReading>;

    /// Reverse lookup of a human-readable description of a position
    async fn describe(&self, coordinate: &LocalCoordinate) -> LocationResult<String> {
        let _ = coordinate;
        Err(LocationError::NotSupported(format!(
            "{} has no reverse lookup",
            self.name()
        )))
    }

    /// Get the provider name (for logging)
    fn name(&self) -> &str;
}

/// Event pushed through a watch
pub type WatchEvent = LocationResult<RawReading>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Consumer end of a continuous position watch
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<WatchEvent>,
    cancelled: bool,
}

/// Provider end of a continuous position watch
#[derive(Debug, Clone)]
pub struct WatchSender {
    id: u64,
    tx: mpsc::Sender<WatchEvent>,
}

impl Subscription {
    /// Create a linked sender/subscription pair
    pub fn channel(capacity: usize) -> (WatchSender, Subscription) {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            WatchSender { id, tx },
            Subscription {
                id,
                rx,
                cancelled: false,
            },
        )
    }

    /// Subscription identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the subscription is cancelled and drained, or the
    /// provider has dropped its sender.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Stop accepting events; the provider sees its sender closed
    pub fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.rx.close();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl WatchSender {
    /// Identifier of the linked subscription
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Push an event, waiting for room in the channel
    ///
    /// Returns `false` when the subscription was cancelled.
    pub async fn push(&self, event: WatchEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Push an event without waiting
    ///
    /// Returns `false` when the subscription was cancelled or the channel is full.
    pub fn try_push(&self, event: WatchEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }

    /// Whether the subscription has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
