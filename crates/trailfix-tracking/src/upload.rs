//! Track upload collaborator
//!
//! The backend endpoint is consumed as a black box: it accepts an ordered
//! batch of samples for an activity and either succeeds or fails. It must be
//! idempotent under retry, since a batch whose acknowledgement was lost is
//! sent again on the next flush.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::buffer::TrackSample;

/// One sample in the upload wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    /// Latitude in the local datum
    pub latitude: f64,
    /// Longitude in the local datum
    pub longitude: f64,
    /// Accuracy radius in meters
    pub accuracy: f64,
    /// Ground speed in m/s, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl From<&TrackSample> for UploadRecord {
    fn from(sample: &TrackSample) -> Self {
        Self {
            latitude: sample.coordinate.latitude,
            longitude: sample.coordinate.longitude,
            accuracy: sample.accuracy_meters,
            speed: sample.speed,
            timestamp: sample.timestamp.timestamp_millis(),
        }
    }
}

/// Ordered batch of samples for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBatch {
    /// Activity the track belongs to
    pub activity_id: u64,
    /// Samples in time order
    pub records: Vec<UploadRecord>,
}

impl TrackBatch {
    /// Build a batch from buffered samples
    pub fn from_samples(activity_id: u64, samples: &[TrackSample]) -> Self {
        Self {
            activity_id,
            records: samples.iter().map(UploadRecord::from).collect(),
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the batch has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Upload collaborator
///
/// `Err` carries a human-readable reason; the recorder keeps the samples and
/// retries on the next flush.
#[async_trait]
pub trait TrackUploader: Send + Sync {
    /// Send one batch
    async fn upload(&self, batch: &TrackBatch) -> std::result::Result<(), String>;
}

/// Outcome of a successful flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,
    /// A batch was accepted and its samples removed from the buffer
    Uploaded {
        /// Samples sent
        sent: usize,
        /// Samples removed from the buffer (fewer than `sent` if some were
        /// evicted while the upload was in flight)
        removed: usize,
    },
}
