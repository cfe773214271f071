//! `workcell-perception` – from camera detections to arm targets.
//!
//! # Modules
//!
//! - [`transform`] – [`FrameGraph`][transform::FrameGraph] and the waiting
//!   [`TransformBuffer`][transform::TransformBuffer]: named reference frames
//!   and the stamped rigid transforms between them, behind the
//!   [`TransformLookup`][transform::TransformLookup] collaborator trait.
//! - [`locator`] – [`locate`][locator::locate]: first-match search for a
//!   part type across a camera snapshot.
//! - [`projection`] – [`CoordinateProjector`][projection::CoordinateProjector]:
//!   converts a camera-frame part pose into a pre-grasp pose in the robot
//!   base frame.

pub mod locator;
pub mod projection;
pub mod transform;

pub use locator::{LocatedPart, locate};
pub use projection::{APPROACH_ORIENTATION, CoordinateProjector, Projection, approach_pose};
pub use transform::{
    FrameGraph, LookupTime, StampedTransform, TransformBuffer, TransformError, TransformLookup,
};
