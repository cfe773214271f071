//! [`LocationResolver`] – bounded wrapper around the material-location service.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use workcell_middleware::{MaterialLocations, ServiceError};
use workcell_types::{CellError, StorageUnit};

const SERVICE_NAME: &str = "material_locations";

/// Asks the inventory service where a material is stored.
///
/// Nothing is cached: every call goes to the service, so a location that
/// appears or disappears between ticks is picked up immediately.
#[derive(Clone)]
pub struct LocationResolver {
    service: Arc<dyn MaterialLocations>,
    timeout: Duration,
}

impl LocationResolver {
    pub fn new(service: Arc<dyn MaterialLocations>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Storage units currently holding `material_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::ServiceUnavailable`] when the call fails, does
    /// not complete within the timeout, or returns no storage unit.
    pub async fn resolve(&self, material_type: &str) -> Result<Vec<StorageUnit>, CellError> {
        let reply = tokio::time::timeout(self.timeout, self.service.material_locations(material_type))
            .await
            .unwrap_or(Err(ServiceError::Timeout(self.timeout.as_millis() as u64)));

        let units = reply.map_err(|e| unavailable(e.to_string()))?;
        if units.is_empty() {
            return Err(unavailable(format!("no storage unit holds [{material_type}]")));
        }
        debug!(material_type, units = units.len(), "material located in storage");
        Ok(units)
    }
}

fn unavailable(reason: String) -> CellError {
    CellError::ServiceUnavailable {
        service: SERVICE_NAME.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(Result<Vec<StorageUnit>, ServiceError>);

    #[async_trait]
    impl MaterialLocations for Fixed {
        async fn material_locations(&self, _: &str) -> Result<Vec<StorageUnit>, ServiceError> {
            self.0.clone()
        }
    }

    struct Hangs;

    #[async_trait]
    impl MaterialLocations for Hangs {
        async fn material_locations(&self, _: &str) -> Result<Vec<StorageUnit>, ServiceError> {
            std::future::pending().await
        }
    }

    fn resolver(service: impl MaterialLocations + 'static) -> LocationResolver {
        LocationResolver::new(Arc::new(service), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn returns_storage_units() {
        let r = resolver(Fixed(Ok(vec![StorageUnit::new("bin3")])));
        assert_eq!(r.resolve("piston_rod_part").await.unwrap(), vec![StorageUnit::new("bin3")]);
    }

    #[tokio::test]
    async fn empty_reply_is_a_failure() {
        let r = resolver(Fixed(Ok(vec![])));
        let err = r.resolve("gear_part").await.unwrap_err();
        match err {
            CellError::ServiceUnavailable { service, reason } => {
                assert_eq!(service, "material_locations");
                assert!(reason.contains("gear_part"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_error_is_propagated() {
        let r = resolver(Fixed(Err(ServiceError::Rejected("bad type".into()))));
        let err = r.resolve("gear_part").await.unwrap_err();
        assert_eq!(err.kind(), "service_unavailable");
        assert!(err.to_string().contains("bad type"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_service_times_out() {
        let r = resolver(Hangs);
        let err = r.resolve("gear_part").await.unwrap_err();
        assert!(err.to_string().contains("timed out after 50 ms"), "{err}");
    }
}
