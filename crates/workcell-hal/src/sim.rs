//! In-process stand-in for the competition simulator.
//!
//! [`SimCell`] answers the start and material-location services from a
//! fixed inventory, installs the cell's static frame tree into a
//! [`TransformBuffer`], and can replay a small demo scenario through a
//! [`CellBridge`]. Call counters and failure injection make it usable as a
//! test double for the control loop.
//!
//! # Example
//!
//! ```rust
//! use workcell_hal::SimCell;
//! use workcell_perception::{LookupTime, TransformBuffer};
//!
//! let cell = SimCell::ariac_demo();
//! let buffer = TransformBuffer::new();
//! cell.install_frames(&buffer);
//!
//! buffer
//!     .lookup_now("arm1_base_link", "logical_camera_bin3_frame", LookupTime::Latest)
//!     .expect("demo cell mounts every bin camera");
//! ```

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use parking_lot::Mutex;
use tracing::{debug, info};
use workcell_middleware::{CellBridge, CompetitionControl, MaterialLocations, ServiceError};
use workcell_perception::{StampedTransform, TransformBuffer};
use workcell_types::{
    CameraObservation, CellError, JointState, Model, Order, Point, Pose, Product, Quaternion,
    Shipment, StartResponse, StorageUnit,
};

/// Root of the simulated frame tree.
pub const WORLD_FRAME: &str = "world";

/// Joint names published by [`SimCell::publish_demo`]; the rail comes first.
pub const DEMO_JOINT_NAMES: [&str; 7] = [
    "linear_arm_actuator_joint",
    "shoulder_pan_joint",
    "shoulder_lift_joint",
    "elbow_joint",
    "wrist_1_joint",
    "wrist_2_joint",
    "wrist_3_joint",
];

/// Simulated work cell. Shared behind `Arc` by the services it implements.
#[derive(Debug)]
pub struct SimCell {
    base_frame: String,
    base_mount: Isometry3<f64>,
    camera_mounts: Vec<(String, Isometry3<f64>)>,
    materials: HashMap<String, Vec<StorageUnit>>,
    start_failure: Mutex<Option<ServiceError>>,
    location_failure: Mutex<Option<ServiceError>>,
    start_calls: AtomicUsize,
    location_calls: AtomicUsize,
}

impl Default for SimCell {
    fn default() -> Self {
        Self::new("arm1_base_link")
    }
}

impl SimCell {
    /// Empty cell whose arm base sits at the world origin.
    pub fn new(base_frame: impl Into<String>) -> Self {
        Self {
            base_frame: base_frame.into(),
            base_mount: Isometry3::identity(),
            camera_mounts: Vec::new(),
            materials: HashMap::new(),
            start_failure: Mutex::new(None),
            location_failure: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
            location_calls: AtomicUsize::new(0),
        }
    }

    /// The demo layout: arm on a rail in front of six bins, each bin with a
    /// downward-looking logical camera.
    pub fn ariac_demo() -> Self {
        let looking_down = UnitQuaternion::from_euler_angles(0.0, FRAC_PI_2, 0.0);
        (0..6)
            .fold(
                Self::default().with_base_mount(Isometry3::translation(0.3, 0.92, 0.9)),
                |cell, i| {
                    let y = 1.9 - 0.765 * i as f64;
                    cell.with_camera_mount(
                        format!("logical_camera_bin{i}_frame"),
                        Isometry3::from_parts(Translation3::new(-0.3, y, 1.7), looking_down),
                    )
                },
            )
            .with_material("piston_rod_part", ["bin3"])
            .with_material("gear_part", ["bin4"])
            .with_material("gasket_part", ["bin5", "bin1"])
            .with_material("disk_part", ["bin2"])
    }

    /// Place the arm base relative to the world.
    pub fn with_base_mount(mut self, world_base: Isometry3<f64>) -> Self {
        self.base_mount = world_base;
        self
    }

    /// Mount a camera frame relative to the world.
    pub fn with_camera_mount(mut self, frame_id: impl Into<String>, world_camera: Isometry3<f64>) -> Self {
        self.camera_mounts.push((frame_id.into(), world_camera));
        self
    }

    /// Stock `material_type` in the given storage units.
    pub fn with_material<I, S>(mut self, material_type: impl Into<String>, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.materials
            .entry(material_type.into())
            .or_default()
            .extend(units.into_iter().map(StorageUnit::new));
        self
    }

    /// Make every start call fail with `error`.
    pub fn with_start_failure(self, error: ServiceError) -> Self {
        *self.start_failure.lock() = Some(error);
        self
    }

    /// Make material-location calls fail with `error` until cleared with `None`.
    pub fn fail_locations(&self, error: Option<ServiceError>) {
        *self.location_failure.lock() = error;
    }

    pub fn base_frame(&self) -> &str {
        &self.base_frame
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::SeqCst)
    }

    /// Publish the static frame tree (`world -> base`, `world -> camera`).
    pub fn install_frames(&self, buffer: &TransformBuffer) {
        buffer.set_transform(StampedTransform::new_static(
            WORLD_FRAME,
            self.base_frame.as_str(),
            self.base_mount,
        ));
        for (frame, mount) in &self.camera_mounts {
            buffer.set_transform(StampedTransform::new_static(WORLD_FRAME, frame.as_str(), *mount));
        }
        info!(cameras = self.camera_mounts.len(), base = %self.base_frame, "sim frames installed");
    }

    /// Replay the demo scenario: one order for a piston rod, a bin 3
    /// detection of that part, and one joint-state sample.
    ///
    /// # Errors
    ///
    /// Propagates [`CellError::Channel`] when a topic has no subscriber.
    pub fn publish_demo(&self, bridge: &CellBridge) -> Result<(), CellError> {
        let mut product = Product::new("piston_rod_part");
        product.pose = Some(Pose::new(Point::new(0.1, -0.1, 0.0), Quaternion::identity()));
        bridge.ingest_order(Order {
            order_id: "order_0".to_string(),
            shipments: vec![Shipment {
                shipment_type: "order_0_shipment_0".to_string(),
                agv_id: "agv1".to_string(),
                products: vec![product],
            }],
        })?;

        bridge.ingest_camera(CameraObservation {
            camera_id: "logical_camera_bin3".to_string(),
            timestamp: Utc::now(),
            models: vec![Model::new(
                "piston_rod_part",
                Pose::new(
                    Point::new(1.0, 0.05, -0.12),
                    Quaternion::new(0.0, -0.707, 0.0, 0.707),
                ),
            )],
        })?;

        bridge.ingest_joint_state(JointState {
            timestamp: Utc::now(),
            name: DEMO_JOINT_NAMES.iter().map(|n| n.to_string()).collect(),
            position: vec![0.0, 3.14, -1.13, 1.51, 3.77, -1.51, 0.0],
        })?;
        debug!("sim demo scenario published");
        Ok(())
    }
}

#[async_trait]
impl CompetitionControl for SimCell {
    async fn start(&self) -> Result<StartResponse, ServiceError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.start_failure.lock().clone() {
            return Err(err);
        }
        Ok(StartResponse {
            success: true,
            message: "competition started".to_string(),
        })
    }
}

#[async_trait]
impl MaterialLocations for SimCell {
    async fn material_locations(&self, material_type: &str) -> Result<Vec<StorageUnit>, ServiceError> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.location_failure.lock().clone() {
            return Err(err);
        }
        Ok(self.materials.get(material_type).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workcell_middleware::{EventBus, Topic};
    use workcell_perception::LookupTime;
    use workcell_types::EventPayload;

    #[tokio::test]
    async fn start_counts_calls_and_succeeds() {
        let cell = SimCell::ariac_demo();
        let reply = cell.start().await.unwrap();
        assert!(reply.success);
        assert_eq!(cell.start_calls(), 1);
    }

    #[tokio::test]
    async fn injected_start_failure_is_returned() {
        let cell = SimCell::default().with_start_failure(ServiceError::Unavailable("no server".into()));
        assert_eq!(
            cell.start().await,
            Err(ServiceError::Unavailable("no server".into()))
        );
        assert_eq!(cell.start_calls(), 1);
    }

    #[tokio::test]
    async fn material_locations_from_inventory() {
        let cell = SimCell::ariac_demo();
        let units = cell.material_locations("gasket_part").await.unwrap();
        assert_eq!(units, vec![StorageUnit::new("bin5"), StorageUnit::new("bin1")]);
        assert!(cell.material_locations("pulley_part").await.unwrap().is_empty());
        assert_eq!(cell.location_calls(), 2);
    }

    #[tokio::test]
    async fn location_failure_can_be_cleared() {
        let cell = SimCell::ariac_demo();
        cell.fail_locations(Some(ServiceError::Timeout(50)));
        assert_eq!(
            cell.material_locations("gear_part").await,
            Err(ServiceError::Timeout(50))
        );
        cell.fail_locations(None);
        assert_eq!(cell.material_locations("gear_part").await.unwrap().len(), 1);
        assert_eq!(cell.location_calls(), 2);
    }

    #[test]
    fn installed_frames_connect_cameras_to_base() {
        let cell = SimCell::ariac_demo();
        let buffer = TransformBuffer::new();
        cell.install_frames(&buffer);

        let t = buffer
            .lookup_now("arm1_base_link", "logical_camera_bin0_frame", LookupTime::Latest)
            .unwrap();
        // world camera (-0.3, 1.9, 1.7) minus world base (0.3, 0.92, 0.9)
        let origin = t.transform.translation.vector;
        assert!((origin.x + 0.6).abs() < 1e-9);
        assert!((origin.y - 0.98).abs() < 1e-9);
        assert!((origin.z - 0.8).abs() < 1e-9);
    }

    #[test]
    fn publish_demo_feeds_every_topic() {
        let bus = EventBus::default();
        let mut orders = bus.subscribe_to(Topic::Orders);
        let mut cameras = bus.subscribe_to(Topic::Cameras);
        let mut joints = bus.subscribe_to(Topic::JointStates);

        SimCell::ariac_demo()
            .publish_demo(&CellBridge::new(bus))
            .unwrap();

        assert!(matches!(
            orders.try_recv().map(|e| e.payload),
            Some(EventPayload::Order(o)) if o.first_product().map(|p| p.part_type.as_str()) == Some("piston_rod_part")
        ));
        assert!(matches!(
            cameras.try_recv().map(|e| e.payload),
            Some(EventPayload::CameraObservation(c)) if c.camera_id == "logical_camera_bin3"
        ));
        assert!(matches!(
            joints.try_recv().map(|e| e.payload),
            Some(EventPayload::JointState(j)) if j.position.len() == 7
        ));
    }

    #[test]
    fn publish_demo_without_subscribers_is_a_channel_error() {
        let err = SimCell::ariac_demo()
            .publish_demo(&CellBridge::new(EventBus::default()))
            .unwrap_err();
        assert_eq!(err.kind(), "channel");
    }
}
