//! `workcell-middleware` – message plumbing for the cell controller.
//!
//! Routes data between the competition transport and the control loop
//! without caring about its meaning.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels, with a lossless queue for orders.
//! - [`bridge`] – [`CellBridge`]: decodes inbound order, camera and
//!   joint-state messages and publishes them onto the bus.
//! - [`services`] – request/response collaborator traits (start-of-run,
//!   material locations).

pub mod bridge;
pub mod bus;
pub mod services;

pub use bridge::CellBridge;
pub use bus::{EventBus, Topic, TopicReceiver};
pub use services::{CompetitionControl, MaterialLocations, ServiceError};
