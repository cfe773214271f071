//! Transform Frame (TF) buffer.
//!
//! Maintains a graph of named reference frames and the stamped rigid-body
//! transforms that relate them. Each [`set_transform`][FrameGraph::set_transform]
//! registers the edge in both directions, so a lookup may walk from child to
//! parent as well as from parent to child; the edges walked are composed via
//! BFS into a single [`StampedTransform`].
//!
//! Transforms follow the convention `T_target_source`: applying the result
//! of `lookup(target, source)` to a pose expressed in `source` yields the same
//! pose expressed in `target`.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::{Isometry3, Vector3};
//! use workcell_perception::transform::{FrameGraph, LookupTime, StampedTransform};
//!
//! let mut tf = FrameGraph::new();
//!
//! // arm base is 1 m along +x from world.
//! tf.set_transform(StampedTransform::new_static(
//!     "world", "arm1_base_link",
//!     Isometry3::translation(1.0, 0.0, 0.0)));
//!
//! // camera is 2 m above world.
//! tf.set_transform(StampedTransform::new_static(
//!     "world", "camera_frame",
//!     Isometry3::translation(0.0, 0.0, 2.0)));
//!
//! let t = tf.lookup("arm1_base_link", "camera_frame", LookupTime::Latest).unwrap();
//! let v = t.transform.translation.vector;
//! assert!((v - Vector3::new(-1.0, 0.0, 2.0)).norm() < 1e-12);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nalgebra::{Isometry3, Quaternion as NaQuaternion, Translation3, UnitQuaternion};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;
use workcell_types::{Point, Pose, Quaternion};

// ────────────────────────────────────────────────────────────────────────────
// Pose conversion
// ────────────────────────────────────────────────────────────────────────────

/// Convert a wire pose into a rigid transform.
///
/// The orientation is normalised; a degenerate (zero) quaternion is read as
/// the identity rotation.
pub fn pose_to_isometry(pose: &Pose) -> Isometry3<f64> {
    let o = pose.orientation;
    let rotation = UnitQuaternion::try_new(NaQuaternion::new(o.w, o.x, o.y, o.z), f64::EPSILON)
        .unwrap_or_else(UnitQuaternion::identity);
    let p = pose.position;
    Isometry3::from_parts(Translation3::new(p.x, p.y, p.z), rotation)
}

/// Convert a rigid transform back into a wire pose.
pub fn isometry_to_pose(iso: &Isometry3<f64>) -> Pose {
    let t = iso.translation.vector;
    // Storage order is [i, j, k, w].
    let q = iso.rotation.quaternion().coords;
    Pose::new(Point::new(t.x, t.y, t.z), Quaternion::new(q.x, q.y, q.z, q.w))
}

// ────────────────────────────────────────────────────────────────────────────
// StampedTransform
// ────────────────────────────────────────────────────────────────────────────

/// A rigid transform between two named frames.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedTransform {
    /// Frame the transformed data is expressed in (the parent).
    pub target_frame: String,
    /// Frame the input data is expressed in (the child).
    pub source_frame: String,
    /// Time the transform is valid at; `None` for static transforms.
    pub stamp: Option<DateTime<Utc>>,
    pub transform: Isometry3<f64>,
}

impl StampedTransform {
    /// A transform that never goes stale.
    pub fn new_static(
        target_frame: impl Into<String>,
        source_frame: impl Into<String>,
        transform: Isometry3<f64>,
    ) -> Self {
        Self {
            target_frame: target_frame.into(),
            source_frame: source_frame.into(),
            stamp: None,
            transform,
        }
    }

    /// A transform valid at `stamp`.
    pub fn new_stamped(
        target_frame: impl Into<String>,
        source_frame: impl Into<String>,
        stamp: DateTime<Utc>,
        transform: Isometry3<f64>,
    ) -> Self {
        Self {
            target_frame: target_frame.into(),
            source_frame: source_frame.into(),
            stamp: Some(stamp),
            transform,
        }
    }

    /// The transform in the opposite direction (`T_source_target`).
    pub fn inverse(&self) -> Self {
        Self {
            target_frame: self.source_frame.clone(),
            source_frame: self.target_frame.clone(),
            stamp: self.stamp,
            transform: self.transform.inverse(),
        }
    }

    /// Re-express `pose`, given in the source frame, in the target frame.
    pub fn apply(&self, pose: &Pose) -> Pose {
        isometry_to_pose(&(self.transform * pose_to_isometry(pose)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Why a transform could not be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("frame [{0}] does not exist in the frame graph")]
    UnknownFrame(String),

    #[error("frames [{target_frame}] and [{source_frame}] are not connected")]
    Disconnected {
        target_frame: String,
        source_frame: String,
    },

    #[error("lookup at {requested} requires extrapolation: newest data for [{frame}] is from {latest}")]
    Extrapolation {
        frame: String,
        requested: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("timed out after {waited_ms} ms: {cause}")]
    Timeout { waited_ms: u64, cause: String },
}

/// Which data a lookup may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTime {
    /// The newest data available for every edge.
    Latest,
    /// Data at or after the given instant for every timestamped edge.
    At(DateTime<Utc>),
}

// ────────────────────────────────────────────────────────────────────────────
// FrameGraph
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Edge {
    transform: Isometry3<f64>,
    stamp: Option<DateTime<Utc>>,
}

/// A graph of named reference frames and the transforms that relate them.
///
/// Frames are identified by arbitrary string names (e.g. `"world"`,
/// `"arm1_base_link"`, `"logical_camera_bin3_frame"`). Only the newest
/// transform per frame pair is kept.
#[derive(Debug, Default)]
pub struct FrameGraph {
    /// `edges[from][to] = T_from_to`
    edges: HashMap<String, HashMap<String, Edge>>,
}

impl FrameGraph {
    /// Create an empty frame graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the transform from `transform.source_frame` into
    /// `transform.target_frame`, along with its inverse.
    pub fn set_transform(&mut self, transform: StampedTransform) {
        let StampedTransform {
            target_frame: parent,
            source_frame: child,
            stamp,
            transform,
        } = transform;

        self.edges.entry(child.clone()).or_default().insert(
            parent.clone(),
            Edge {
                transform: transform.inverse(),
                stamp,
            },
        );
        self.edges
            .entry(parent)
            .or_default()
            .insert(child, Edge { transform, stamp });
    }

    /// `true` if any transform mentions `frame`.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame)
    }

    /// Compose the transform that maps data in `source_frame` into
    /// `target_frame`.
    ///
    /// The result is stamped with the requested time for
    /// [`LookupTime::At`], and with the oldest stamp on the path for
    /// [`LookupTime::Latest`] (`None` when every edge is static).
    pub fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<StampedTransform, TransformError> {
        let requested = match time {
            LookupTime::At(t) => Some(t),
            LookupTime::Latest => None,
        };

        if target_frame == source_frame {
            return Ok(StampedTransform {
                target_frame: target_frame.to_string(),
                source_frame: source_frame.to_string(),
                stamp: requested,
                transform: Isometry3::identity(),
            });
        }
        for frame in [target_frame, source_frame] {
            if !self.has_frame(frame) {
                return Err(TransformError::UnknownFrame(frame.to_string()));
            }
        }

        // BFS from the target; each queue item carries T_target_current and
        // the oldest stamp seen on the way.
        let mut queue: VecDeque<(&str, Isometry3<f64>, Option<DateTime<Utc>>)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stale: Option<TransformError> = None;

        queue.push_back((target_frame, Isometry3::identity(), None));
        visited.insert(target_frame);

        while let Some((current, accumulated, oldest)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(current) else {
                continue;
            };
            for (next, edge) in neighbours {
                if visited.contains(next.as_str()) {
                    continue;
                }
                if let (Some(t), Some(stamp)) = (requested, edge.stamp)
                    && stamp < t
                {
                    stale.get_or_insert(TransformError::Extrapolation {
                        frame: next.clone(),
                        requested: t,
                        latest: stamp,
                    });
                    continue;
                }
                let composed = accumulated * edge.transform;
                let oldest = match (oldest, edge.stamp) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                if next == source_frame {
                    return Ok(StampedTransform {
                        target_frame: target_frame.to_string(),
                        source_frame: source_frame.to_string(),
                        stamp: requested.or(oldest),
                        transform: composed,
                    });
                }
                visited.insert(next.as_str());
                queue.push_back((next.as_str(), composed, oldest));
            }
        }

        Err(stale.unwrap_or_else(|| TransformError::Disconnected {
            target_frame: target_frame.to_string(),
            source_frame: source_frame.to_string(),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lookup collaborator
// ────────────────────────────────────────────────────────────────────────────

/// Source of frame-to-frame transforms.
#[async_trait]
pub trait TransformLookup: Send + Sync {
    /// Resolve `T_target_source` at `time`, waiting up to `timeout` for the
    /// data to become available.
    async fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
        timeout: Duration,
    ) -> Result<StampedTransform, TransformError>;
}

/// Shared [`FrameGraph`] whose lookups can wait for transforms that have not
/// arrived yet. Clones share the same graph.
#[derive(Clone, Debug, Default)]
pub struct TransformBuffer {
    graph: Arc<RwLock<FrameGraph>>,
    changed: Arc<Notify>,
}

impl TransformBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a transform and wake any waiting lookups.
    pub fn set_transform(&self, transform: StampedTransform) {
        debug!(
            parent = %transform.target_frame,
            child = %transform.source_frame,
            "transform updated"
        );
        self.graph.write().set_transform(transform);
        self.changed.notify_waiters();
    }

    /// Single non-waiting lookup.
    pub fn lookup_now(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<StampedTransform, TransformError> {
        self.graph.read().lookup(target_frame, source_frame, time)
    }
}

#[async_trait]
impl TransformLookup for TransformBuffer {
    async fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
        timeout: Duration,
    ) -> Result<StampedTransform, TransformError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register for wake-ups before checking so an update landing
            // between the check and the wait is not missed.
            let notified = self.changed.notified();
            let cause = match self.lookup_now(target_frame, source_frame, time) {
                Ok(found) => return Ok(found),
                Err(e) => e,
            };
            if timeout.is_zero() {
                return Err(cause);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(TransformError::Timeout {
                    waited_ms: timeout.as_millis() as u64,
                    cause: cause.to_string(),
                });
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
