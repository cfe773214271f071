//! Camera-frame detection → robot-base pre-grasp pose.
//!
//! The sensed part pose is re-expressed in the base frame, lifted by a fixed
//! standoff along base +z, and given a fixed top-down approach orientation.
//! The part's sensed orientation is discarded: every approach uses the same
//! end-effector attitude.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use workcell_types::{CellError, Pose, Quaternion};

use crate::transform::{LookupTime, StampedTransform, TransformLookup};

/// End-effector attitude used for every approach.
pub const APPROACH_ORIENTATION: Quaternion = Quaternion {
    x: 0.0,
    y: 0.707,
    z: 0.0,
    w: 0.707,
};

/// Default height of the approach pose above the part, in metres.
pub const DEFAULT_STANDOFF_M: f64 = 0.10;

/// Default wait for the camera → base transform.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of projecting one detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// The part pose re-expressed in the base frame.
    pub part_in_base: Pose,
    /// The pre-grasp pose handed to the arm.
    pub approach: Pose,
}

/// Pure projection of `part_pose` through `camera_to_base`.
pub fn approach_pose(part_pose: &Pose, camera_to_base: &StampedTransform, standoff_m: f64) -> Projection {
    let part_in_base = camera_to_base.apply(part_pose);
    let mut approach = part_in_base;
    approach.position.z += standoff_m;
    approach.orientation = APPROACH_ORIENTATION;
    Projection {
        part_in_base,
        approach,
    }
}

/// Projects detections into the robot base frame using a
/// [`TransformLookup`] collaborator.
#[derive(Clone)]
pub struct CoordinateProjector {
    lookup: Arc<dyn TransformLookup>,
    base_frame: String,
    standoff_m: f64,
    lookup_timeout: Duration,
}

impl CoordinateProjector {
    pub fn new(
        lookup: Arc<dyn TransformLookup>,
        base_frame: impl Into<String>,
        standoff_m: f64,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            base_frame: base_frame.into(),
            standoff_m,
            lookup_timeout,
        }
    }

    pub fn base_frame(&self) -> &str {
        &self.base_frame
    }

    /// Project `part_pose`, expressed in `camera_frame`, into the base frame.
    ///
    /// Uses the newest available transform, waiting at most the configured
    /// timeout for one to appear.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::TransformUnavailable`] carrying the lookup
    /// failure when the frames cannot be related in time.
    pub async fn project(&self, part_pose: &Pose, camera_frame: &str) -> Result<Projection, CellError> {
        let camera_to_base = self
            .lookup
            .lookup_transform(&self.base_frame, camera_frame, LookupTime::Latest, self.lookup_timeout)
            .await
            .map_err(|e| CellError::TransformUnavailable {
                source_frame: camera_frame.to_string(),
                target_frame: self.base_frame.clone(),
                reason: e.to_string(),
            })?;
        debug!(
            target_frame = %camera_to_base.target_frame,
            source_frame = %camera_to_base.source_frame,
            "resolved camera transform"
        );
        Ok(approach_pose(part_pose, &camera_to_base, self.standoff_m))
    }
}
