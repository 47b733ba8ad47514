//! Bounded in-memory track sample buffer
//!
//! Samples are kept in arrival order. Once the cap is exceeded the oldest
//! sample is dropped. Every sample gets a monotonically increasing sequence
//! number so a flush can remove exactly the samples it uploaded, even when
//! new samples arrived or old ones were evicted while the upload was in
//! flight.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

use trailfix_core::{path_length_meters, CoordinateTransformer, LocalCoordinate, RawCoordinate};

use crate::provider::RawReading;

/// One recorded track point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    /// Position in the local datum
    pub coordinate: LocalCoordinate,
    /// Position as reported by the device
    pub raw_coordinate: RawCoordinate,
    /// Accuracy radius in meters
    pub accuracy_meters: f64,
    /// Ground speed in m/s, if reported
    pub speed: Option<f64>,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl TrackSample {
    /// Build a sample from a raw device reading
    pub fn from_reading(reading: &RawReading, transformer: &CoordinateTransformer) -> Self {
        Self {
            coordinate: transformer.to_local_datum(&reading.coordinate),
            raw_coordinate: reading.coordinate,
            accuracy_meters: reading.accuracy_meters,
            speed: reading.speed,
            timestamp: reading.timestamp,
        }
    }
}

/// Samples copied out of the buffer for upload
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Copied samples in arrival order
    pub samples: Vec<TrackSample>,
    /// Sequence number of the last copied sample
    last_seq: Option<u64>,
}

impl Snapshot {
    /// Number of samples in the snapshot
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when nothing was buffered
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    samples: VecDeque<(u64, TrackSample)>,
    next_seq: u64,
    evicted: u64,
}

/// Thread-safe FIFO buffer of track samples with a fixed cap
///
/// One mutex guards append, snapshot and clear; it is never held across an
/// await point.
#[derive(Debug)]
pub struct SampleBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl SampleBuffer {
    /// Create a buffer holding at most `capacity` samples (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                samples: VecDeque::with_capacity(capacity.min(4096)),
                next_seq: 0,
                evicted: 0,
            }),
            capacity,
        }
    }

    /// Maximum number of samples kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest when over the cap
    ///
    /// Returns the number of samples evicted (0 or 1).
    pub fn push(&self, sample: TrackSample) -> usize {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.samples.push_back((seq, sample));

        let mut evicted = 0;
        while inner.samples.len() > self.capacity {
            inner.samples.pop_front();
            evicted += 1;
        }
        inner.evicted += evicted as u64;
        if evicted > 0 {
            trace!(evicted, capacity = self.capacity, "Evicted oldest track samples");
        }
        evicted
    }

    /// Copy the current contents for upload
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            samples: inner.samples.iter().map(|(_, s)| s.clone()).collect(),
            last_seq: inner.samples.back().map(|(seq, _)| *seq),
        }
    }

    /// Remove every sample that was part of `snapshot`
    ///
    /// Samples appended after the snapshot was taken are kept. Returns the
    /// number of samples removed.
    pub fn acknowledge(&self, snapshot: &Snapshot) -> usize {
        let Some(last_seq) = snapshot.last_seq else {
            return 0;
        };

        let mut inner = self.inner.lock();
        let mut removed = 0;
        while let Some((seq, _)) = inner.samples.front() {
            if *seq > last_seq {
                break;
            }
            inner.samples.pop_front();
            removed += 1;
        }
        removed
    }

    /// Copy of the buffered samples in arrival order
    pub fn samples(&self) -> Vec<TrackSample> {
        self.inner.lock().samples.iter().map(|(_, s)| s.clone()).collect()
    }

    /// Drop every buffered sample
    pub fn clear(&self) {
        self.inner.lock().samples.clear();
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.inner.lock().samples.is_empty()
    }

    /// Total samples evicted because of the cap
    pub fn evicted(&self) -> u64 {
        self.inner.lock().evicted
    }

    /// Length of the buffered track in meters (local datum)
    pub fn path_length_meters(&self) -> f64 {
        let inner = self.inner.lock();
        path_length_meters(inner.samples.iter().map(|(_, s)| &s.coordinate))
    }
}

#[cfg(test)]
pub(crate) fn sample_at(lat: f64, lon: f64) -> TrackSample {
    let raw = RawCoordinate::new(lat, lon);
    TrackSample {
        coordinate: raw.to_local_datum(),
        raw_coordinate: raw,
        accuracy_meters: 5.0,
        speed: None,
        timestamp: Utc::now(),
    }
}
