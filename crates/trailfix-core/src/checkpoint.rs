//! Checkpoints and check-in progress

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::coordinate::LocalCoordinate;
use crate::error::{CoreError, Result};

/// Organizer-defined arrival point along an activity route
///
/// Serialized in the backend's flat shape:
/// `{"id":1,"latitude":..,"longitude":..,"radius":100,"sequence":1,"isRequired":true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Checkpoint identifier
    pub id: u64,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Center of the geofence (GCJ02)
    #[serde(flatten)]
    pub coordinate: LocalCoordinate,
    /// Arrival radius in meters
    #[serde(rename = "radius")]
    pub radius_meters: f64,
    /// Order along the route
    #[serde(default)]
    pub sequence: u32,
    /// Whether the checkpoint must be visited to finish
    #[serde(default = "default_required")]
    pub is_required: bool,
}

fn default_required() -> bool {
    true
}

impl Checkpoint {
    /// Create a required checkpoint
    pub fn new(id: u64, coordinate: LocalCoordinate, radius_meters: f64) -> Self {
        Self {
            id,
            name: None,
            coordinate,
            radius_meters,
            sequence: 0,
            is_required: true,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the route sequence
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Mark the checkpoint optional
    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    /// Reject checkpoints that cannot be evaluated
    pub fn validate(&self) -> Result<()> {
        if !self.coordinate.is_valid() {
            return Err(CoreError::InvalidCoordinate {
                latitude: self.coordinate.latitude,
                longitude: self.coordinate.longitude,
            });
        }
        if !self.radius_meters.is_finite() || self.radius_meters < 0.0 {
            return Err(CoreError::InvalidRadius(self.radius_meters));
        }
        Ok(())
    }
}

/// Parse and validate a checkpoint list from JSON
pub fn checkpoints_from_json(json: &str) -> Result<Vec<Checkpoint>> {
    let mut checkpoints: Vec<Checkpoint> = serde_json::from_str(json)?;
    for checkpoint in &checkpoints {
        checkpoint.validate()?;
    }
    checkpoints.sort_by_key(|c| c.sequence);
    Ok(checkpoints)
}

/// Completion summary for an activity's checkpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInProgress {
    /// Checkpoints already checked in
    pub completed: usize,
    /// Total checkpoints
    pub total: usize,
    /// Completion percentage, rounded
    pub percent: u8,
    /// Every required checkpoint is done
    pub required_complete: bool,
}

impl CheckInProgress {
    /// Summarize progress given the ids of completed checkpoints
    ///
    /// Ids that do not belong to `checkpoints` are ignored.
    pub fn compute(checkpoints: &[Checkpoint], completed_ids: &[u64]) -> Self {
        let done: HashSet<u64> = completed_ids.iter().copied().collect();

        let total = checkpoints.len();
        let completed = checkpoints.iter().filter(|c| done.contains(&c.id)).count();
        let percent = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        };
        let required_complete = checkpoints
            .iter()
            .filter(|c| c.is_required)
            .all(|c| done.contains(&c.id));

        Self {
            completed,
            total,
            percent,
            required_complete,
        }
    }
}
