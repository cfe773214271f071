//! Shared data model for the pick-and-place work cell.
//!
//! Field names follow the competition wire format (`camelCase`, part types
//! carried in a `type` field) so messages can be decoded straight off the
//! transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// An orientation quaternion in `(x, y, z, w)` wire order.
///
/// Not required to be normalised; consumers that need a rotation normalise
/// on conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// A 6-DOF pose: position plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn new(position: Point, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orders
// ────────────────────────────────────────────────────────────────────────────

/// A single requested part. Matching uses `part_type` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "type")]
    pub part_type: String,
    /// Desired placement on the destination tray, when the order specifies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
}

impl Product {
    pub fn new(part_type: impl Into<String>) -> Self {
        Self {
            part_type: part_type.into(),
            pose: None,
        }
    }
}

/// Products bound for one destination.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    #[serde(default)]
    pub shipment_type: String,
    /// Destination AGV, e.g. `"agv1"`. Empty when unassigned.
    #[serde(default)]
    pub agv_id: String,
    #[serde(default)]
    pub products: Vec<Product>,
}

/// A fulfilment order. Immutable once received.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub shipments: Vec<Shipment>,
}

impl Order {
    /// First product of the first shipment, or `None` when either sequence
    /// is empty.
    pub fn first_product(&self) -> Option<&Product> {
        self.shipments.first()?.products.first()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensors
// ────────────────────────────────────────────────────────────────────────────

/// One detection reported by a logical camera, posed in the camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[serde(rename = "type")]
    pub part_type: String,
    pub pose: Pose,
}

impl Model {
    pub fn new(part_type: impl Into<String>, pose: Pose) -> Self {
        Self {
            part_type: part_type.into(),
            pose,
        }
    }
}

/// The full detection list of one camera at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraObservation {
    pub camera_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub models: Vec<Model>,
}

/// Arm joint feedback. `position` is indexed by the arm's joint-ordering
/// convention and may carry extra leading joints (e.g. a linear rail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointState {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub name: Vec<String>,
    pub position: Vec<f64>,
}

// ────────────────────────────────────────────────────────────────────────────
// Services
// ────────────────────────────────────────────────────────────────────────────

/// An inventory location returned by the material-location service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUnit {
    pub unit_id: String,
}

impl StorageUnit {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
        }
    }
}

/// Reply of the start-of-run call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline output
// ────────────────────────────────────────────────────────────────────────────

/// Pre-grasp pose above a located part, expressed in the robot base frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPose {
    pub frame_id: String,
    pub material_type: String,
    /// Name of the camera whose detection produced this target.
    pub camera: String,
    /// Inventory locations reported for the material, in service order.
    #[serde(default)]
    pub storage_units: Vec<StorageUnit>,
    pub pose: Pose,
}

// ────────────────────────────────────────────────────────────────────────────
// Event bus
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "workcell-middleware::bridge/orders"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a freshly stamped event.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Order(Order),
    CameraObservation(CameraObservation),
    JointState(JointState),
    TargetPose(TargetPose),
    PipelineFault { kind: String, detail: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every layer of the cell controller.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellError {
    #[error("Service {service} unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("Material [{material_type}] not seen by any camera")]
    NotFound { material_type: String },

    #[error("Transform from [{source_frame}] to [{target_frame}] unavailable: {reason}")]
    TransformUnavailable {
        source_frame: String,
        target_frame: String,
        reason: String,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl CellError {
    /// Short stable label used in telemetry events and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CellError::ServiceUnavailable { .. } => "service_unavailable",
            CellError::NotFound { .. } => "not_found",
            CellError::TransformUnavailable { .. } => "transform_unavailable",
            CellError::MalformedInput(_) => "malformed_input",
            CellError::Serialization(_) => "serialization",
            CellError::Channel(_) => "channel",
            CellError::Config(_) => "config",
        }
    }
}
