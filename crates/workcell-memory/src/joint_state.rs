//! Most recent arm joint feedback.

use std::sync::Arc;

use parking_lot::Mutex;
use workcell_types::JointState;

/// Number of revolute joints on the arm.
pub const ARM_JOINTS: usize = 6;

/// Shared holder of the latest [`JointState`] sample.
#[derive(Clone, Debug, Default)]
pub struct JointStateCache {
    latest: Arc<Mutex<Option<JointState>>>,
}

impl JointStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, state: JointState) {
        *self.latest.lock() = Some(state);
    }

    pub fn latest(&self) -> Option<JointState> {
        self.latest.lock().clone()
    }

    /// The six arm joint angles, starting at `offset` in the position vector.
    ///
    /// Returns `None` before the first sample or when the sample is too short.
    pub fn arm_joints(&self, offset: usize) -> Option<[f64; ARM_JOINTS]> {
        let guard = self.latest.lock();
        let position = &guard.as_ref()?.position;
        let slice = position.get(offset..offset + ARM_JOINTS)?;
        let mut joints = [0.0; ARM_JOINTS];
        joints.copy_from_slice(slice);
        Some(joints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(position: Vec<f64>) -> JointState {
        JointState {
            timestamp: Utc::now(),
            name: Vec::new(),
            position,
        }
    }

    #[test]
    fn empty_cache_yields_nothing() {
        let cache = JointStateCache::new();
        assert!(cache.latest().is_none());
        assert!(cache.arm_joints(0).is_none());
    }

    #[test]
    fn arm_joints_skip_leading_rail_joint() {
        let cache = JointStateCache::new();
        cache.update(sample(vec![9.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]));
        assert_eq!(cache.arm_joints(1), Some([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]));
        assert_eq!(cache.arm_joints(0), Some([9.0, 0.1, 0.2, 0.3, 0.4, 0.5]));
    }

    #[test]
    fn short_sample_is_rejected() {
        let cache = JointStateCache::new();
        cache.update(sample(vec![0.0; 6]));
        assert!(cache.arm_joints(1).is_none());
    }

    #[test]
    fn newest_sample_replaces_previous() {
        let cache = JointStateCache::new();
        cache.update(sample(vec![0.0; 7]));
        cache.update(sample(vec![1.0; 7]));
        assert_eq!(cache.arm_joints(1), Some([1.0; 6]));
    }
}
