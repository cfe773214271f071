//! `workcell-memory` – in-process cell state.
//!
//! Holds the only mutable state shared between inbound-message handling and
//! the control loop. Every store is a cheap-to-clone handle over a mutex, so
//! ingestion and the loop can hold their own copies; nothing here is
//! persisted across restarts.
//!
//! # Modules
//!
//! - [`camera_aggregator`] – [`CameraAggregator`]: latest observation per
//!   fixed camera slot, with atomic whole-cell snapshots.
//! - [`order_queue`] – [`OrderQueue`]: append-only, insertion-ordered orders.
//! - [`joint_state`] – [`JointStateCache`]: most recent arm joint feedback.

pub mod camera_aggregator;
pub mod joint_state;
pub mod order_queue;

pub use camera_aggregator::{
    CameraAggregator, CameraDescriptor, CameraIndex, CameraSnapshot, ariac_cameras,
};
pub use joint_state::{ARM_JOINTS, JointStateCache};
pub use order_queue::OrderQueue;
