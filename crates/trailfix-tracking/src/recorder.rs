//! TrackRecorder - continuous track recording session
//!
//! The recorder opens a continuous watch on the device sensor, turns every
//! pushed reading into a [`TrackSample`], buffers it and periodically flushes
//! the buffer to a [`TrackUploader`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TrackRecorder                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌────────────────┐   ┌─────────────┐   ┌────────────────┐   │
//! │  │ DeviceProvider │──►│  pump task  │──►│  SampleBuffer  │   │
//! │  │ (Subscription) │   │ on_sample / │   │  (FIFO, cap)   │   │
//! │  └────────────────┘   │ on_error    │   └───────┬────────┘   │
//! │                       └─────────────┘           │            │
//! │                       ┌─────────────┐   ┌───────▼────────┐   │
//! │                       │ flush timer │──►│ TrackUploader  │   │
//! │                       └─────────────┘   └────────────────┘   │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let recorder = TrackRecorder::new(activity_id, provider, uploader, TrackingConfig::default());
//!
//! recorder.start(
//!     Arc::new(|sample| println!("{}", sample.coordinate)),
//!     Arc::new(|err| eprintln!("sensor hiccup: {err}")),
//! )?;
//!
//! // ... later
//! recorder.stop().await?;
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use trailfix_core::CoordinateTransformer;

use crate::buffer::{SampleBuffer, TrackSample};
use crate::config::TrackingConfig;
use crate::error::{LocationError, Result, TrackingError};
use crate::provider::{DeviceProvider, RawReading, Subscription, WatchEvent};
use crate::upload::{FlushOutcome, TrackBatch, TrackUploader};

/// Callback invoked synchronously for every recorded sample
pub type SampleCallback = Arc<dyn Fn(&TrackSample) + Send + Sync>;

/// Callback invoked for every error pushed by the watch, and once with
/// [`LocationError::watch_closed`] if the provider ends the watch
pub type ErrorCallback = Arc<dyn Fn(&LocationError) + Send + Sync>;

/// Recorder statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    /// Readings turned into samples
    pub samples_received: u64,
    /// Samples dropped by the buffer cap
    pub samples_evicted: u64,
    /// Watch errors passed to `on_error`
    pub errors_forwarded: u64,
    /// Flushes accepted by the uploader
    pub flushes_succeeded: u64,
    /// Flushes rejected by the uploader
    pub flushes_failed: u64,
    /// Samples removed from the buffer after a successful upload
    pub samples_uploaded: u64,
}

/// State shared between the recorder, the pump task and the flush timer
struct Shared {
    activity_id: u64,
    buffer: SampleBuffer,
    uploader: Arc<dyn TrackUploader>,
    transformer: CoordinateTransformer,
    stats: Mutex<RecorderStats>,
}

impl Shared {
    fn record(&self, reading: &RawReading, on_sample: &SampleCallback) {
        let sample = TrackSample::from_reading(reading, &self.transformer);
        let evicted = self.buffer.push(sample.clone());
        {
            let mut stats = self.stats.lock();
            stats.samples_received += 1;
            stats.samples_evicted += evicted as u64;
        }
        trace!(
            lat = sample.coordinate.latitude,
            lon = sample.coordinate.longitude,
            accuracy_m = sample.accuracy_meters,
            "Recorded track sample"
        );
        on_sample(&sample);
    }

    fn dispatch(&self, event: WatchEvent, on_sample: &SampleCallback, on_error: &ErrorCallback) {
        match event {
            Ok(reading) => self.record(&reading, on_sample),
            Err(err) => self.forward_error(&err, on_error),
        }
    }

    fn forward_error(&self, err: &LocationError, on_error: &ErrorCallback) {
        self.stats.lock().errors_forwarded += 1;
        warn!(error = %err, code = err.error_code(), "Position watch error");
        on_error(err);
    }

    async fn flush(&self, uploader: &dyn TrackUploader) -> Result<FlushOutcome> {
        let snapshot = self.buffer.snapshot();
        if snapshot.is_empty() {
            trace!("Nothing to flush");
            return Ok(FlushOutcome::Empty);
        }

        let batch = TrackBatch::from_samples(self.activity_id, &snapshot.samples);
        match uploader.upload(&batch).await {
            Ok(()) => {
                let removed = self.buffer.acknowledge(&snapshot);
                {
                    let mut stats = self.stats.lock();
                    stats.flushes_succeeded += 1;
                    stats.samples_uploaded += removed as u64;
                }
                debug!(
                    activity_id = self.activity_id,
                    sent = batch.len(),
                    removed,
                    remaining = self.buffer.len(),
                    "Flushed track samples"
                );
                Ok(FlushOutcome::Uploaded {
                    sent: batch.len(),
                    removed,
                })
            }
            Err(reason) => {
                self.stats.lock().flushes_failed += 1;
                warn!(
                    activity_id = self.activity_id,
                    count = batch.len(),
                    %reason,
                    "Track upload failed, keeping samples for retry"
                );
                Err(TrackingError::UploadFailed {
                    count: batch.len(),
                    reason,
                })
            }
        }
    }
}

/// Tasks and handles owned while recording
struct ActiveSession {
    id: Uuid,
    shutdown_tx: watch::Sender<bool>,
    pump: JoinHandle<()>,
    timer: JoinHandle<()>,
}

/// Continuous track recorder for one activity
///
/// Control calls (`start`/`stop`) must be serialized by the caller; every
/// other method may be called concurrently.
pub struct TrackRecorder {
    shared: Arc<Shared>,
    provider: Arc<dyn DeviceProvider>,
    config: TrackingConfig,
    session: Mutex<Option<ActiveSession>>,
}

impl TrackRecorder {
    /// Create an idle recorder
    pub fn new(
        activity_id: u64,
        provider: Arc<dyn DeviceProvider>,
        uploader: Arc<dyn TrackUploader>,
        config: TrackingConfig,
    ) -> Self {
        let shared = Shared {
            activity_id,
            buffer: SampleBuffer::new(config.recorder.max_samples),
            uploader,
            transformer: CoordinateTransformer::new(config.source.region_policy),
            stats: Mutex::new(RecorderStats::default()),
        };

        Self {
            shared: Arc::new(shared),
            provider,
            config,
            session: Mutex::new(None),
        }
    }

    /// Activity the track belongs to
    pub fn activity_id(&self) -> u64 {
        self.shared.activity_id
    }

    /// Start recording
    ///
    /// A no-op while already recording. Fails with `InvalidConfig` when the
    /// configuration does not validate, or when the provider refuses to open
    /// a watch. Must be called from within a tokio runtime.
    pub fn start(&self, on_sample: SampleCallback, on_error: ErrorCallback) -> Result<()> {
        let mut session = self.session.lock();
        if let Some(active) = session.as_ref() {
            warn!(session = %active.id, "Track recording already active, ignoring start");
            return Ok(());
        }
        self.config.validate()?;

        self.shared.buffer.clear();
        let subscription = self
            .provider
            .watch_position(&self.config.recorder.watch_options())?;

        let id = Uuid::new_v4();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pump = tokio::spawn(run_pump(
            self.shared.clone(),
            subscription,
            shutdown_rx.clone(),
            on_sample,
            on_error,
        ));
        let timer = tokio::spawn(run_flush_timer(
            self.shared.clone(),
            self.config.recorder.flush_interval,
            shutdown_rx,
        ));

        info!(
            session = %id,
            activity_id = self.shared.activity_id,
            provider = self.provider.name(),
            flush_interval = ?self.config.recorder.flush_interval,
            max_samples = self.shared.buffer.capacity(),
            "Track recording started"
        );

        *session = Some(ActiveSession {
            id,
            shutdown_tx,
            pump,
            timer,
        });
        Ok(())
    }

    /// Stop recording and flush what is buffered
    ///
    /// Returns `Ok(None)` when not recording. Once this returns no further
    /// sample is appended. A failed final flush leaves the samples buffered
    /// and is returned as the error.
    pub async fn stop(&self) -> Result<Option<FlushOutcome>> {
        let active = self.session.lock().take();
        let Some(active) = active else {
            debug!("Track recorder not active, ignoring stop");
            return Ok(None);
        };

        let _ = active.shutdown_tx.send(true);

        active.pump.await?;
        active.timer.await?;

        info!(
            session = %active.id,
            activity_id = self.shared.activity_id,
            buffered = self.shared.buffer.len(),
            "Track recording stopped"
        );

        self.flush().await.map(Some)
    }

    /// Flush buffered samples to the configured uploader
    pub async fn flush(&self) -> Result<FlushOutcome> {
        self.shared.flush(self.shared.uploader.as_ref()).await
    }

    /// Flush buffered samples to `uploader`
    pub async fn flush_with(&self, uploader: &dyn TrackUploader) -> Result<FlushOutcome> {
        self.shared.flush(uploader).await
    }

    /// Copy of the buffered samples in time order
    pub fn tracks(&self) -> Vec<TrackSample> {
        self.shared.buffer.samples()
    }

    /// Drop every buffered sample
    pub fn clear(&self) {
        self.shared.buffer.clear();
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.shared.buffer.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.shared.buffer.is_empty()
    }

    /// Whether a session is active
    pub fn is_recording(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Identifier of the active session
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.lock().as_ref().map(|s| s.id)
    }

    /// Length of the buffered track in meters
    pub fn total_distance_meters(&self) -> f64 {
        self.shared.buffer.path_length_meters()
    }

    /// Recorder statistics
    pub fn stats(&self) -> RecorderStats {
        self.shared.stats.lock().clone()
    }
}

impl Drop for TrackRecorder {
    fn drop(&mut self) {
        if let Some(active) = self.session.get_mut().take() {
            let _ = active.shutdown_tx.send(true);
            active.pump.abort();
            active.timer.abort();
            debug!(session = %active.id, "Track recorder dropped while recording");
        }
    }
}

/// Consume the watch until shutdown or until the provider closes it
async fn run_pump(
    shared: Arc<Shared>,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
    on_sample: SampleCallback,
    on_error: ErrorCallback,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            event = subscription.next() => match event {
                Some(event) => shared.dispatch(event, &on_sample, &on_error),
                None => {
                    info!(subscription = subscription.id(), "Position watch closed by provider");
                    shared.forward_error(&LocationError::watch_closed(), &on_error);
                    return;
                }
            },
        }
    }

    // Refuse new readings, keep the ones already delivered
    subscription.cancel();
    let mut drained = 0usize;
    while let Some(event) = subscription.next().await {
        shared.dispatch(event, &on_sample, &on_error);
        drained += 1;
    }
    debug!(subscription = subscription.id(), drained, "Position watch cancelled");
}

/// Flush the buffer every `period` until shutdown
async fn run_flush_timer(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            _ = ticker.tick() => {
                // Failures are logged in flush and retried on the next tick
                let _ = shared.flush(shared.uploader.as_ref()).await;
            }
        }
    }
}
