//! Latest-observation store for a fixed set of logical cameras.
//!
//! The camera set is fixed when the aggregator is built; slot indices are
//! handed out as [`CameraIndex`] values by the aggregator itself. An index
//! taken from a different, larger aggregator is out of range here: lookups
//! return `None` and updates are dropped with a warning.
//!
//! Each update replaces its slot wholesale (last write wins). A
//! [`CameraSnapshot`] copies every slot under one lock acquisition, so a scan
//! over it never mixes old and new detection lists.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};
use workcell_types::{CameraObservation, CellError};

/// Static description of one camera slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    /// Channel name, e.g. `"logical_camera_bin3"`.
    pub name: String,
    /// Coordinate frame the camera reports poses in.
    pub frame_id: String,
}

impl CameraDescriptor {
    pub fn new(name: impl Into<String>, frame_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frame_id: frame_id.into(),
        }
    }

    /// Descriptor whose frame follows the `<name>_frame` convention.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let frame_id = format!("{name}_frame");
        Self { name, frame_id }
    }
}

/// The work cell's camera layout in scan order: six bin cameras, two AGV
/// cameras, two quality-control sensors.
pub fn ariac_cameras() -> Vec<CameraDescriptor> {
    let bins = (0..6).map(|i| CameraDescriptor::named(format!("logical_camera_bin{i}")));
    let agvs = (1..=2).map(|i| CameraDescriptor::named(format!("logical_camera_agv{i}")));
    let quality = (1..=2).map(|i| CameraDescriptor::named(format!("quality_control_sensor_{i}")));
    bins.chain(agvs).chain(quality).collect()
}

/// Index of a camera slot, valid for the aggregator that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraIndex(usize);

impl CameraIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

type Slots = Vec<Option<Arc<CameraObservation>>>;

/// Shared handle to the per-camera observation slots.
#[derive(Clone, Debug)]
pub struct CameraAggregator {
    cameras: Arc<[CameraDescriptor]>,
    slots: Arc<Mutex<Slots>>,
}

impl CameraAggregator {
    /// Build an aggregator for `cameras`, in scan order.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Config`] when the list is empty or two cameras
    /// share a name.
    pub fn new(cameras: Vec<CameraDescriptor>) -> Result<Self, CellError> {
        if cameras.is_empty() {
            return Err(CellError::Config("camera list is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for camera in &cameras {
            if !seen.insert(camera.name.as_str()) {
                return Err(CellError::Config(format!("duplicate camera name {}", camera.name)));
            }
        }
        let slots = vec![None; cameras.len()];
        Ok(Self {
            cameras: cameras.into(),
            slots: Arc::new(Mutex::new(slots)),
        })
    }

    /// Number of camera slots.
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Always `false`: construction rejects an empty camera list.
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Slot at position `i` in scan order, if it exists.
    pub fn index(&self, i: usize) -> Option<CameraIndex> {
        (i < self.cameras.len()).then_some(CameraIndex(i))
    }

    /// Slot of the camera called `name`.
    pub fn index_of(&self, name: &str) -> Option<CameraIndex> {
        self.cameras.iter().position(|c| c.name == name).map(CameraIndex)
    }

    pub fn descriptor(&self, index: CameraIndex) -> Option<&CameraDescriptor> {
        self.cameras.get(index.0)
    }

    /// Replace the observation held for `index`. Returns `false`, storing
    /// nothing, when `index` is out of range for this aggregator.
    pub fn update(&self, index: CameraIndex, observation: CameraObservation) -> bool {
        let Some(camera) = self.cameras.get(index.0) else {
            warn!(index = index.0, cameras = self.cameras.len(), "camera index out of range; update dropped");
            return false;
        };
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(index.0) else {
            return false;
        };
        trace!(camera = %camera.name, models = observation.models.len(), "camera slot updated");
        *slot = Some(Arc::new(observation));
        true
    }

    /// Copy of every slot, taken atomically with respect to [`update`][Self::update].
    pub fn snapshot(&self) -> CameraSnapshot {
        let slots = self.slots.lock().clone();
        CameraSnapshot {
            cameras: Arc::clone(&self.cameras),
            slots,
        }
    }
}

/// Read-only view of all camera slots at one instant.
#[derive(Debug, Clone)]
pub struct CameraSnapshot {
    cameras: Arc<[CameraDescriptor]>,
    slots: Slots,
}

impl CameraSnapshot {
    /// Iterate slots in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (CameraIndex, &CameraDescriptor, Option<&CameraObservation>)> {
        self.cameras
            .iter()
            .zip(self.slots.iter())
            .enumerate()
            .map(|(i, (camera, slot))| (CameraIndex(i), camera, slot.as_deref()))
    }

    pub fn observation(&self, index: CameraIndex) -> Option<&CameraObservation> {
        self.slots.get(index.0)?.as_deref()
    }

    pub fn descriptor(&self, index: CameraIndex) -> Option<&CameraDescriptor> {
        self.cameras.get(index.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use workcell_types::{Model, Pose};

    fn observation(camera: &str, types: &[&str]) -> CameraObservation {
        CameraObservation {
            camera_id: camera.to_string(),
            timestamp: Utc::now(),
            models: types.iter().map(|t| Model::new(*t, Pose::default())).collect(),
        }
    }

    #[test]
    fn default_layout_has_ten_cameras_in_scan_order() {
        let cameras = ariac_cameras();
        assert_eq!(cameras.len(), 10);
        assert_eq!(cameras[0].name, "logical_camera_bin0");
        assert_eq!(cameras[3].frame_id, "logical_camera_bin3_frame");
        assert_eq!(cameras[6].name, "logical_camera_agv1");
        assert_eq!(cameras[9].frame_id, "quality_control_sensor_2_frame");
    }

    #[test]
    fn construction_rejects_empty_and_duplicate_layouts() {
        assert!(matches!(CameraAggregator::new(vec![]), Err(CellError::Config(_))));
        let dup = vec![CameraDescriptor::named("cam"), CameraDescriptor::named("cam")];
        assert!(matches!(CameraAggregator::new(dup), Err(CellError::Config(_))));
    }

    #[test]
    fn index_is_bounded_by_camera_count() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        assert!(agg.index(9).is_some());
        assert!(agg.index(10).is_none());
        assert_eq!(agg.index_of("logical_camera_agv2").map(CameraIndex::get), Some(7));
        assert!(agg.index_of("ghost_camera").is_none());
    }

    #[test]
    fn last_write_wins_per_slot() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        let idx = agg.index(2).unwrap();
        agg.update(idx, observation("logical_camera_bin2", &["gear_part"]));
        agg.update(idx, observation("logical_camera_bin2", &["pulley_part", "disk_part"]));

        let snap = agg.snapshot();
        let obs = snap.observation(idx).unwrap();
        let types: Vec<_> = obs.models.iter().map(|m| m.part_type.as_str()).collect();
        assert_eq!(types, ["pulley_part", "disk_part"]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_updates() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        let idx = agg.index(0).unwrap();
        agg.update(idx, observation("logical_camera_bin0", &["gear_part"]));

        let snap = agg.snapshot();
        agg.update(idx, observation("logical_camera_bin0", &[]));

        assert_eq!(snap.observation(idx).unwrap().models.len(), 1);
        assert!(agg.snapshot().observation(idx).unwrap().models.is_empty());
    }

    #[test]
    fn snapshot_iterates_every_slot_in_order() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        agg.update(agg.index(4).unwrap(), observation("logical_camera_bin4", &["gear_part"]));

        let snap = agg.snapshot();
        let indices: Vec<usize> = snap.iter().map(|(i, _, _)| i.get()).collect();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
        let filled: Vec<usize> = snap
            .iter()
            .filter(|(_, _, obs)| obs.is_some())
            .map(|(i, _, _)| i.get())
            .collect();
        assert_eq!(filled, [4]);
    }

    #[test]
    fn index_from_larger_aggregator_is_rejected() {
        let large = CameraAggregator::new(ariac_cameras()).unwrap();
        let small = CameraAggregator::new(vec![CameraDescriptor::named("logical_camera_bin0")]).unwrap();
        let foreign = large.index(9).unwrap();

        assert!(small.descriptor(foreign).is_none());
        assert!(!small.update(foreign, observation("quality_control_sensor_2", &["gear_part"])));

        let snap = small.snapshot();
        assert!(snap.observation(foreign).is_none());
        assert!(snap.descriptor(foreign).is_none());
        assert!(snap.iter().all(|(_, _, obs)| obs.is_none()));
        assert_eq!(large.descriptor(foreign).map(|c| c.name.as_str()), Some("quality_control_sensor_2"));
    }

    #[test]
    fn clones_share_slots() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        let writer = agg.clone();
        let idx = writer.index_of("logical_camera_bin1").unwrap();
        writer.update(idx, observation("logical_camera_bin1", &["gear_part"]));
        assert!(agg.snapshot().observation(idx).is_some());
    }
}
