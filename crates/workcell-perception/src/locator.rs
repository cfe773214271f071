//! First-match part search over a camera snapshot.
//!
//! Cameras are scanned in ascending slot order and, within a camera, models
//! in the order the camera reported them. The first model whose type equals
//! the requested type wins, so when several cameras see the same part type
//! the lowest-indexed camera is authoritative. The result depends only on the
//! snapshot and the type, which keeps runs reproducible.

use workcell_memory::{CameraIndex, CameraSnapshot};
use workcell_types::{CellError, Model};

/// A model found in one camera's detection list.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedPart {
    pub camera: CameraIndex,
    pub camera_name: String,
    /// Frame the model's pose is expressed in.
    pub frame_id: String,
    pub model: Model,
}

/// Find the first model of `part_type` in `snapshot`.
///
/// # Errors
///
/// Returns [`CellError::NotFound`] when no camera currently reports the type.
pub fn locate(snapshot: &CameraSnapshot, part_type: &str) -> Result<LocatedPart, CellError> {
    snapshot
        .iter()
        .filter_map(|(index, camera, observation)| Some((index, camera, observation?)))
        .find_map(|(index, camera, observation)| {
            observation
                .models
                .iter()
                .find(|model| model.part_type == part_type)
                .map(|model| LocatedPart {
                    camera: index,
                    camera_name: camera.name.clone(),
                    frame_id: camera.frame_id.clone(),
                    model: model.clone(),
                })
        })
        .ok_or_else(|| CellError::NotFound {
            material_type: part_type.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use workcell_memory::{CameraAggregator, ariac_cameras};
    use workcell_types::{CameraObservation, Point, Pose};

    fn model(part: &str, x: f64) -> Model {
        Model::new(part, Pose::new(Point::new(x, 0.0, 0.0), Default::default()))
    }

    fn publish(agg: &CameraAggregator, slot: usize, models: Vec<Model>) {
        let index = agg.index(slot).unwrap();
        agg.update(
            index,
            CameraObservation {
                camera_id: agg.descriptor(index).unwrap().name.clone(),
                timestamp: Utc::now(),
                models,
            },
        );
    }

    #[test]
    fn empty_snapshot_reports_not_found() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        let result = locate(&agg.snapshot(), "gear_part");
        assert_eq!(
            result,
            Err(CellError::NotFound {
                material_type: "gear_part".to_string()
            })
        );
    }

    #[test]
    fn lowest_camera_index_wins() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        publish(&agg, 4, vec![model("gear_part", 4.0)]);
        publish(&agg, 2, vec![model("gear_part", 2.0)]);

        let found = locate(&agg.snapshot(), "gear_part").unwrap();
        assert_eq!(found.camera.get(), 2);
        assert_eq!(found.camera_name, "logical_camera_bin2");
        assert_eq!(found.frame_id, "logical_camera_bin2_frame");
        assert_eq!(found.model.pose.position.x, 2.0);
    }

    #[test]
    fn first_model_within_a_camera_wins() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        publish(
            &agg,
            1,
            vec![model("disk_part", 0.0), model("gear_part", 1.0), model("gear_part", 2.0)],
        );
        let found = locate(&agg.snapshot(), "gear_part").unwrap();
        assert_eq!(found.model.pose.position.x, 1.0);
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        publish(&agg, 7, vec![model("pulley_part", 7.0)]);
        publish(&agg, 8, vec![model("pulley_part", 8.0)]);
        let snap = agg.snapshot();

        let first = locate(&snap, "pulley_part").unwrap();
        for _ in 0..5 {
            assert_eq!(locate(&snap, "pulley_part").unwrap(), first);
        }
        assert_eq!(first.camera_name, "logical_camera_agv2");
    }

    #[test]
    fn type_match_is_exact() {
        let agg = CameraAggregator::new(ariac_cameras()).unwrap();
        publish(&agg, 0, vec![model("gear_part_2", 0.0)]);
        assert!(locate(&agg.snapshot(), "gear_part").is_err());
    }
}
