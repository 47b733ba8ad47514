//! Check-in admission by geofence
//!
//! [`GeofenceEvaluator::evaluate`] is the only admission check for a
//! check-in. The fix must already be in the local datum; nothing is
//! transformed here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checkpoint::Checkpoint;
use crate::fix::PositionFix;
use crate::geo::distance_meters;

/// Outcome of a geofence test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceResult {
    /// The fix lies within the checkpoint radius (inclusive)
    pub in_range: bool,
    /// Distance to the checkpoint center, rounded to whole meters
    pub distance_meters: i64,
}

impl GeofenceResult {
    /// Meters the user still has to close to reach the radius, 0 when inside
    pub fn shortfall_meters(&self, radius_meters: f64) -> i64 {
        if self.in_range {
            0
        } else {
            (self.distance_meters - radius_meters.floor() as i64).max(0)
        }
    }
}

/// Result of evaluating one checkpoint out of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointEvaluation {
    /// Checkpoint id
    pub checkpoint_id: u64,
    /// Geofence outcome
    #[serde(flatten)]
    pub result: GeofenceResult,
}

/// Stateless geofence evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct GeofenceEvaluator;

impl GeofenceEvaluator {
    /// Evaluate a fix against one checkpoint
    pub fn evaluate(fix: &PositionFix, checkpoint: &Checkpoint) -> GeofenceResult {
        let distance = distance_meters(&fix.coordinate, &checkpoint.coordinate);
        let result = GeofenceResult {
            in_range: distance <= checkpoint.radius_meters,
            distance_meters: distance.round() as i64,
        };

        debug!(
            checkpoint = checkpoint.id,
            distance_m = distance,
            radius_m = checkpoint.radius_meters,
            in_range = result.in_range,
            "Evaluated geofence"
        );

        result
    }

    /// Evaluate a fix against every checkpoint, in route sequence order
    pub fn evaluate_all(fix: &PositionFix, checkpoints: &[Checkpoint]) -> Vec<CheckpointEvaluation> {
        let mut ordered: Vec<&Checkpoint> = checkpoints.iter().collect();
        ordered.sort_by_key(|c| c.sequence);

        ordered
            .into_iter()
            .map(|checkpoint| CheckpointEvaluation {
                checkpoint_id: checkpoint.id,
                result: Self::evaluate(fix, checkpoint),
            })
            .collect()
    }

    /// The checkpoint closest to the fix, with its evaluation
    pub fn nearest<'a>(
        fix: &PositionFix,
        checkpoints: &'a [Checkpoint],
    ) -> Option<(&'a Checkpoint, GeofenceResult)> {
        checkpoints
            .iter()
            .map(|checkpoint| {
                let d = distance_meters(&fix.coordinate, &checkpoint.coordinate);
                (checkpoint, d)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(checkpoint, _)| (checkpoint, Self::evaluate(fix, checkpoint)))
    }
}
