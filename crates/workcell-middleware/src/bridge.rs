//! Inbound message bridge.
//!
//! [`CellBridge`] ingests competition messages (orders, logical-camera
//! images, joint states), either already typed or as JSON text, and
//! publishes them onto the [`EventBus`] topic each belongs to. It does not
//! interpret the data beyond decoding it.

use serde::de::DeserializeOwned;
use tracing::debug;
use workcell_types::{CameraObservation, CellError, Event, EventPayload, JointState, Order};

use crate::bus::{EventBus, Topic};

const SOURCE_ORDERS: &str = "workcell-middleware::bridge/orders";
const SOURCE_CAMERAS: &str = "workcell-middleware::bridge/cameras";
const SOURCE_JOINTS: &str = "workcell-middleware::bridge/joint_states";

/// Bridge between the competition transport and the internal [`EventBus`].
#[derive(Clone, Debug)]
pub struct CellBridge {
    bus: EventBus,
}

impl CellBridge {
    /// Create a new bridge publishing onto `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Publish a received order on [`Topic::Orders`].
    pub fn ingest_order(&self, order: Order) -> Result<usize, CellError> {
        debug!(order_id = %order.order_id, shipments = order.shipments.len(), "order received");
        self.bus
            .publish_to(Topic::Orders, Event::new(SOURCE_ORDERS, EventPayload::Order(order)))
    }

    /// Publish a camera observation on [`Topic::Cameras`].
    pub fn ingest_camera(&self, observation: CameraObservation) -> Result<usize, CellError> {
        self.bus.publish_to(
            Topic::Cameras,
            Event::new(SOURCE_CAMERAS, EventPayload::CameraObservation(observation)),
        )
    }

    /// Publish a joint-state sample on [`Topic::JointStates`].
    pub fn ingest_joint_state(&self, state: JointState) -> Result<usize, CellError> {
        self.bus.publish_to(
            Topic::JointStates,
            Event::new(SOURCE_JOINTS, EventPayload::JointState(state)),
        )
    }

    /// Decode an order message and publish it.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Serialization`] for malformed JSON and
    /// [`CellError::Channel`] when nobody is subscribed.
    pub fn ingest_order_json(&self, json: &str) -> Result<usize, CellError> {
        self.ingest_order(decode(json, "order")?)
    }

    /// Decode a camera message received on `channel` and publish it.
    ///
    /// The channel name is authoritative for routing: it overwrites the
    /// `cameraId` field, which the transport may leave empty.
    pub fn ingest_camera_json(&self, channel: &str, json: &str) -> Result<usize, CellError> {
        let mut observation: CameraObservation = decode(json, "camera observation")?;
        observation.camera_id = camera_name_from_channel(channel).to_string();
        self.ingest_camera(observation)
    }

    /// Decode a joint-state message and publish it.
    pub fn ingest_joint_state_json(&self, json: &str) -> Result<usize, CellError> {
        self.ingest_joint_state(decode(json, "joint state")?)
    }
}

/// Strip a topic namespace: `"/ariac/logical_camera_bin3"` → `"logical_camera_bin3"`.
pub fn camera_name_from_channel(channel: &str) -> &str {
    channel.rsplit('/').next().unwrap_or(channel)
}

fn decode<T: DeserializeOwned>(json: &str, what: &str) -> Result<T, CellError> {
    serde_json::from_str(json).map_err(|e| CellError::Serialization(format!("invalid {what} message: {e}")))
}
