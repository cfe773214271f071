//! [`ControlLoop`] – the fixed-rate decision pipeline of the work cell.
//!
//! The loop starts in [`LoopState::AwaitingCompetitionStart`], asks the
//! competition to start once (a failed start is logged and the loop runs
//! anyway), and then ticks at a fixed period. Each tick:
//!
//! 1. **Drain** – move every buffered order, camera observation and joint
//!    state from the [`EventBus`] into the cell state. Never blocks; an
//!    update published while a tick is running is seen by the next tick.
//! 2. **Decide** – for the oldest order's first product:
//!    [`LocationResolver::resolve`] → [`locate`] on an atomic camera
//!    snapshot → [`CoordinateProjector::project`]. The first failing step
//!    ends the tick with [`TickOutcome::Skipped`].
//! 3. **Report** – log the outcome (repeats are latched to debug level) and
//!    publish it on [`Topic::Telemetry`].
//!
//! Once the part has been located on any tick, forward kinematics runs on
//! every later tick, whether or not that tick finds the part again.
//!
//! The oldest order is never removed: every tick re-reads the same order
//! and re-derives the same target until the process stops.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use workcell_hal::SimCell;
//! use workcell_middleware::EventBus;
//! use workcell_perception::TransformBuffer;
//! use workcell_runtime::control_loop::{CellServices, ControlLoop, ControlLoopConfig};
//!
//! # async fn demo() -> Result<(), workcell_types::CellError> {
//! let cell = Arc::new(SimCell::ariac_demo());
//! let transforms = TransformBuffer::new();
//! cell.install_frames(&transforms);
//!
//! let services = CellServices {
//!     control: cell.clone(),
//!     locations: cell,
//!     transforms: Arc::new(transforms),
//! };
//! let mut control = ControlLoop::new(ControlLoopConfig::default(), EventBus::default(), services)?;
//! control.run(Arc::new(AtomicBool::new(false))).await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use workcell_hal::UrKinematics;
use workcell_hal::kinematics::{matrix_to_pose, pose_to_matrix};
use workcell_memory::{CameraAggregator, CameraDescriptor, JointStateCache, OrderQueue, ariac_cameras};
use workcell_middleware::{CompetitionControl, EventBus, MaterialLocations, Topic, TopicReceiver};
use workcell_perception::projection::{DEFAULT_LOOKUP_TIMEOUT, DEFAULT_STANDOFF_M};
use workcell_perception::{CoordinateProjector, TransformLookup, locate};
use workcell_types::{CellError, Event, EventPayload, Pose, TargetPose};

use crate::location::LocationResolver;
use crate::report::{ReportLatch, Throttle};

const SOURCE: &str = "workcell-runtime::control_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ControlLoop`].
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Time between tick boundaries.
    pub tick_period: Duration,
    /// Camera slots in scan order; the order is the locator's tie-break.
    pub cameras: Vec<CameraDescriptor>,
    /// Frame every target pose is expressed in.
    pub base_frame: String,
    /// Height of the approach pose above the part, in metres.
    pub standoff_m: f64,
    /// Longest wait for a camera → base transform.
    pub transform_timeout: Duration,
    /// Longest wait for any service reply.
    pub service_timeout: Duration,
    /// Index of the first arm joint in joint-state position vectors.
    pub joint_offset: usize,
    /// Also solve inverse kinematics for every target.
    pub solve_ik: bool,
    /// Minimum time between two tool-pose log lines.
    pub fk_log_interval: Duration,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            cameras: ariac_cameras(),
            base_frame: "arm1_base_link".to_string(),
            standoff_m: DEFAULT_STANDOFF_M,
            transform_timeout: DEFAULT_LOOKUP_TIMEOUT,
            service_timeout: Duration::from_secs(2),
            joint_offset: 1,
            solve_ik: false,
            fk_log_interval: Duration::from_secs(10),
        }
    }
}

/// External collaborators the loop calls into.
#[derive(Clone)]
pub struct CellServices {
    pub control: Arc<dyn CompetitionControl>,
    pub locations: Arc<dyn MaterialLocations>,
    pub transforms: Arc<dyn TransformLookup>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingCompetitionStart,
    Running,
}

/// Why a tick had nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// No order has been received yet.
    NoOrders,
    /// The oldest order has no shipment or its first shipment no product.
    EmptyOrder,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle(IdleReason),
    Target(TargetPose),
    Skipped(CellError),
}

impl TickOutcome {
    /// Latch key. Leaves out the pose so jitter on a stationary part stays
    /// latched.
    fn report_key(&self) -> String {
        match self {
            TickOutcome::Idle(reason) => format!("idle:{reason:?}"),
            TickOutcome::Target(t) => format!("target:{}:{}", t.material_type, t.camera),
            TickOutcome::Skipped(e) => format!("{}:{e}", e.kind()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop {
    state: LoopState,
    tick_period: Duration,
    service_timeout: Duration,
    joint_offset: usize,
    solve_ik: bool,

    bus: EventBus,
    orders_rx: TopicReceiver,
    cameras_rx: TopicReceiver,
    joints_rx: TopicReceiver,

    orders: OrderQueue,
    cameras: CameraAggregator,
    joints: JointStateCache,

    control: Arc<dyn CompetitionControl>,
    resolver: LocationResolver,
    projector: CoordinateProjector,
    kinematics: UrKinematics,

    latch: ReportLatch,
    fk_throttle: Throttle,
    part_seen: bool,
    tool_pose: Option<Pose>,
    ik_branches: Option<usize>,
    ticks: u64,
}

impl ControlLoop {
    /// Build the loop and subscribe to its inbound topics.
    ///
    /// Messages published on `bus` before this call are not seen.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Config`] for a zero tick period or an invalid
    /// camera layout.
    pub fn new(config: ControlLoopConfig, bus: EventBus, services: CellServices) -> Result<Self, CellError> {
        if config.tick_period.is_zero() {
            return Err(CellError::Config("tick period must be positive".to_string()));
        }
        let cameras = CameraAggregator::new(config.cameras)?;
        info!(
            cameras = cameras.len(),
            base_frame = %config.base_frame,
            period_ms = config.tick_period.as_millis() as u64,
            "control loop configured"
        );

        Ok(Self {
            state: LoopState::AwaitingCompetitionStart,
            tick_period: config.tick_period,
            service_timeout: config.service_timeout,
            joint_offset: config.joint_offset,
            solve_ik: config.solve_ik,
            orders_rx: bus.subscribe_to(Topic::Orders),
            cameras_rx: bus.subscribe_to(Topic::Cameras),
            joints_rx: bus.subscribe_to(Topic::JointStates),
            bus,
            orders: OrderQueue::new(),
            cameras,
            joints: JointStateCache::new(),
            control: services.control,
            resolver: LocationResolver::new(services.locations, config.service_timeout),
            projector: CoordinateProjector::new(
                services.transforms,
                config.base_frame,
                config.standoff_m,
                config.transform_timeout,
            ),
            kinematics: UrKinematics::default(),
            latch: ReportLatch::new(),
            fk_throttle: Throttle::new(config.fk_log_interval),
            part_seen: false,
            tool_pose: None,
            ik_branches: None,
            ticks: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn orders(&self) -> &OrderQueue {
        &self.orders
    }

    pub fn cameras(&self) -> &CameraAggregator {
        &self.cameras
    }

    pub fn joints(&self) -> &JointStateCache {
        &self.joints
    }

    /// Tool pose from the latest forward-kinematics pass.
    pub fn tool_pose(&self) -> Option<Pose> {
        self.tool_pose
    }

    /// Number of IK branches found for the latest target (`solve_ik` only).
    pub fn ik_branches(&self) -> Option<usize> {
        self.ik_branches
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// One-shot start call. Any failure is logged and the loop proceeds to
    /// [`LoopState::Running`] regardless.
    pub async fn start(&mut self) {
        if self.state == LoopState::Running {
            return;
        }
        match tokio::time::timeout(self.service_timeout, self.control.start()).await {
            Ok(Ok(reply)) if reply.success => info!(message = %reply.message, "competition started"),
            Ok(Ok(reply)) => warn!(message = %reply.message, "competition start refused; running anyway"),
            Ok(Err(e)) => warn!(error = %e, "competition start failed; running anyway"),
            Err(_) => warn!(
                timeout_ms = self.service_timeout.as_millis() as u64,
                "competition start timed out; running anyway"
            ),
        }
        self.state = LoopState::Running;
    }

    /// Tick at the configured period until `shutdown` is set. Returns the
    /// number of ticks run.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> u64 {
        self.start().await;
        let mut interval = tokio::time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let first = self.ticks;
        loop {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.tick().await;
        }
        let ran = self.ticks - first;
        info!(ticks = ran, "control loop stopped");
        ran
    }

    /// Run one drain → decide → report cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.state == LoopState::AwaitingCompetitionStart {
            self.start().await;
        }
        self.ticks += 1;
        self.drain();

        let outcome = self.decide().await.unwrap_or_else(TickOutcome::Skipped);
        if self.part_seen {
            self.update_tool_pose();
        }
        self.report(&outcome);
        outcome
    }

    // -------------------------------------------------------------------------
    // Tick stages
    // -------------------------------------------------------------------------

    fn drain(&mut self) {
        while let Some(event) = self.orders_rx.try_recv() {
            if let EventPayload::Order(order) = event.payload {
                self.orders.enqueue(order);
            }
        }
        while let Some(event) = self.cameras_rx.try_recv() {
            let EventPayload::CameraObservation(observation) = event.payload else {
                continue;
            };
            match self.cameras.index_of(&observation.camera_id) {
                Some(index) => {
                    self.cameras.update(index, observation);
                }
                None => warn!(camera = %observation.camera_id, "observation from unknown camera dropped"),
            }
        }
        while let Some(event) = self.joints_rx.try_recv() {
            if let EventPayload::JointState(state) = event.payload {
                self.joints.update(state);
            }
        }
    }

    async fn decide(&mut self) -> Result<TickOutcome, CellError> {
        let Some(order) = self.orders.peek_oldest() else {
            return Ok(TickOutcome::Idle(IdleReason::NoOrders));
        };
        let Some(product) = order.first_product() else {
            return Ok(TickOutcome::Idle(IdleReason::EmptyOrder));
        };
        let material_type = product.part_type.clone();

        let units = self.resolver.resolve(&material_type).await?;
        let snapshot = self.cameras.snapshot();
        let located = locate(&snapshot, &material_type)?;
        let sensed = located.model.pose.position;
        if !self.part_seen {
            self.part_seen = true;
            info!(
                material_type = %material_type,
                storage_unit = %units.first().map(|u| u.unit_id.as_str()).unwrap_or_default(),
                camera = %located.camera_name,
                frame = %located.frame_id,
                x = sensed.x, y = sensed.y, z = sensed.z,
                "part located"
            );
        } else {
            debug!(
                material_type = %material_type,
                camera = %located.camera_name,
                x = sensed.x, y = sensed.y, z = sensed.z,
                "part located"
            );
        }

        let projection = self.projector.project(&located.model.pose, &located.frame_id).await?;
        if self.solve_ik {
            let branches = self.kinematics.inverse(&pose_to_matrix(&projection.approach)).len();
            debug!(material_type = %material_type, branches, "inverse kinematics for target");
            self.ik_branches = Some(branches);
        }

        Ok(TickOutcome::Target(TargetPose {
            frame_id: self.projector.base_frame().to_string(),
            material_type,
            camera: located.camera_name,
            storage_units: units,
            pose: projection.approach,
        }))
    }

    /// Forward kinematics on the latest joint state. Keeps the previous pose
    /// while no joint state has arrived.
    fn update_tool_pose(&mut self) {
        let Some(joints) = self.joints.arm_joints(self.joint_offset) else {
            return;
        };
        let pose = matrix_to_pose(&self.kinematics.forward_joints(&joints));
        if self.fk_throttle.ready() {
            let p = pose.position;
            info!(x = p.x, y = p.y, z = p.z, "arm tool pose");
        }
        self.tool_pose = Some(pose);
    }

    fn report(&mut self, outcome: &TickOutcome) {
        let fresh = self.latch.observe(&outcome.report_key());
        let payload = match outcome {
            TickOutcome::Idle(reason) => {
                if fresh {
                    info!(reason = ?reason, "nothing to do");
                }
                return;
            }
            TickOutcome::Target(target) => {
                let p = target.pose.position;
                if fresh {
                    info!(
                        material_type = %target.material_type,
                        storage_units = ?target.storage_units.iter().map(|u| u.unit_id.as_str()).collect::<Vec<_>>(),
                        camera = %target.camera,
                        frame = %target.frame_id,
                        x = p.x, y = p.y, z = p.z,
                        "target pose ready"
                    );
                } else {
                    debug!(material_type = %target.material_type, x = p.x, y = p.y, z = p.z, "target pose");
                }
                EventPayload::TargetPose(target.clone())
            }
            TickOutcome::Skipped(err) => {
                if fresh {
                    log_failure(err);
                } else {
                    debug!(kind = err.kind(), "tick skipped again");
                }
                EventPayload::PipelineFault {
                    kind: err.kind().to_string(),
                    detail: err.to_string(),
                }
            }
        };
        if self.bus.publish_to(Topic::Telemetry, Event::new(SOURCE, payload)).is_err() {
            debug!("no telemetry subscribers");
        }
    }
}

fn log_failure(err: &CellError) {
    match err {
        CellError::ServiceUnavailable { service, reason } => {
            warn!(service = %service, reason = %reason, "service call failed; retrying next tick");
        }
        CellError::NotFound { material_type } => {
            warn!(material_type = %material_type, "part not seen by any camera");
        }
        CellError::TransformUnavailable {
            source_frame,
            target_frame,
            reason,
        } => {
            warn!(frame = %source_frame, target = %target_frame, reason = %reason, "camera transform unavailable");
        }
        other => error!(kind = other.kind(), error = %other, "tick failed"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
