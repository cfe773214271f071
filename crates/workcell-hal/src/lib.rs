//! `workcell-hal` – the arm and the cell it sits in.
//!
//! # Modules
//!
//! - [`kinematics`] – [`UrKinematics`][kinematics::UrKinematics]: analytic
//!   forward and inverse kinematics for a six-joint UR-style arm.
//! - [`sim`] – [`SimCell`][sim::SimCell]: in-process stand-in for the
//!   competition services, camera mounts and sensor feeds, so the full stack
//!   runs without the simulator.

pub mod kinematics;
pub mod sim;

pub use kinematics::{JointVector, UrKinematics, UrParameters};
pub use sim::SimCell;
