//! Request/response collaborators.
//!
//! The competition exposes its services over the transport; the controller
//! only sees these traits. Implementations must be cheap to call repeatedly
//! because the control loop retries on every tick instead of caching.

use async_trait::async_trait;
use thiserror::Error;
use workcell_types::{StartResponse, StorageUnit};

/// Failure of a single service call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The call could not be delivered or no server answered.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The call did not complete within the allowed time.
    #[error("service call timed out after {0} ms")]
    Timeout(u64),
    /// The server answered but refused the request.
    #[error("service rejected request: {0}")]
    Rejected(String),
}

/// The start-of-run call (`/ariac/start_competition`).
#[async_trait]
pub trait CompetitionControl: Send + Sync {
    /// Ask the competition to begin.
    async fn start(&self) -> Result<StartResponse, ServiceError>;
}

/// The inventory-location call (`/ariac/material_locations`).
#[async_trait]
pub trait MaterialLocations: Send + Sync {
    /// Return every storage unit currently holding `material_type`.
    ///
    /// An empty list is a valid reply; callers decide whether it counts as
    /// a failure.
    async fn material_locations(&self, material_type: &str) -> Result<Vec<StorageUnit>, ServiceError>;
}
