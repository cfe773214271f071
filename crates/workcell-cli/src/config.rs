//! Controller settings – reads/writes `~/.workcell/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use workcell_memory::{CameraDescriptor, ariac_cameras};
use workcell_runtime::ControlLoopConfig;
use workcell_types::CellError;

/// One logical camera: the channel name it publishes on and its frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraEntry {
    pub name: String,
    pub frame: String,
}

/// Persisted controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control loop rate in Hz.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,

    /// Frame target poses are expressed in.
    #[serde(default = "default_base_frame")]
    pub base_frame: String,

    /// Height of the approach pose above the part, in metres.
    #[serde(default = "default_standoff_m")]
    pub standoff_m: f64,

    #[serde(default = "default_transform_timeout_ms")]
    pub transform_timeout_ms: u64,

    #[serde(default = "default_service_timeout_ms")]
    pub service_timeout_ms: u64,

    /// Index of the first arm joint in joint-state messages (the linear rail
    /// comes first).
    #[serde(default = "default_joint_offset")]
    pub joint_offset: usize,

    #[serde(default)]
    pub solve_ik: bool,

    #[serde(default = "default_fk_log_interval_s")]
    pub fk_log_interval_s: u64,

    /// Cameras in scan order.
    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraEntry>,
}

fn default_tick_hz() -> f64 {
    10.0
}
fn default_base_frame() -> String {
    "arm1_base_link".to_string()
}
fn default_standoff_m() -> f64 {
    0.10
}
fn default_transform_timeout_ms() -> u64 {
    1000
}
fn default_service_timeout_ms() -> u64 {
    2000
}
fn default_joint_offset() -> usize {
    1
}
fn default_fk_log_interval_s() -> u64 {
    10
}
fn default_cameras() -> Vec<CameraEntry> {
    ariac_cameras()
        .into_iter()
        .map(|c| CameraEntry {
            name: c.name,
            frame: c.frame_id,
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            base_frame: default_base_frame(),
            standoff_m: default_standoff_m(),
            transform_timeout_ms: default_transform_timeout_ms(),
            service_timeout_ms: default_service_timeout_ms(),
            joint_offset: default_joint_offset(),
            solve_ik: false,
            fk_log_interval_s: default_fk_log_interval_s(),
            cameras: default_cameras(),
        }
    }
}

impl Config {
    /// Reject settings the control loop cannot run with.
    pub fn validate(&self) -> Result<(), CellError> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(CellError::Config(format!("tick_hz must be positive, got {}", self.tick_hz)));
        }
        if !self.standoff_m.is_finite() {
            return Err(CellError::Config("standoff_m must be finite".to_string()));
        }
        if self.base_frame.is_empty() {
            return Err(CellError::Config("base_frame must not be empty".to_string()));
        }
        if self.cameras.is_empty() {
            return Err(CellError::Config("at least one camera is required".to_string()));
        }
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.name.as_str()) {
                return Err(CellError::Config(format!("camera [{}] listed twice", camera.name)));
            }
        }
        Ok(())
    }

    /// Runtime settings derived from this file.
    pub fn control_loop_config(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            tick_period: Duration::from_secs_f64(1.0 / self.tick_hz),
            cameras: self
                .cameras
                .iter()
                .map(|c| CameraDescriptor::new(c.name.as_str(), c.frame.as_str()))
                .collect(),
            base_frame: self.base_frame.clone(),
            standoff_m: self.standoff_m,
            transform_timeout: Duration::from_millis(self.transform_timeout_ms),
            service_timeout: Duration::from_millis(self.service_timeout_ms),
            joint_offset: self.joint_offset,
            solve_ik: self.solve_ik,
            fk_log_interval: Duration::from_secs(self.fk_log_interval_s),
        }
    }
}

/// Return the path to `~/.workcell/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".workcell").join("config.toml")
}

/// Load the config and apply environment overrides. `None` when no file exists.
pub fn load() -> Result<Option<Config>, CellError> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, CellError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| CellError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| CellError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Write `cfg` to `path`, creating the parent directory.
#[cfg(test)]
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), CellError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CellError::Config(format!("failed to create {}: {e}", parent.display())))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| CellError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| CellError::Config(format!("failed to write {}: {e}", path.display())))
}

/// Apply `WORKCELL_*` environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WORKCELL_TICK_HZ` | `tick_hz` |
/// | `WORKCELL_BASE_FRAME` | `base_frame` |
/// | `WORKCELL_STANDOFF_M` | `standoff_m` |
/// | `WORKCELL_TRANSFORM_TIMEOUT_MS` | `transform_timeout_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(hz) = var("WORKCELL_TICK_HZ").and_then(|v| v.parse().ok()) {
        cfg.tick_hz = hz;
    }
    if let Some(frame) = var("WORKCELL_BASE_FRAME").filter(|v| !v.is_empty()) {
        cfg.base_frame = frame;
    }
    if let Some(standoff) = var("WORKCELL_STANDOFF_M").and_then(|v| v.parse().ok()) {
        cfg.standoff_m = standoff;
    }
    if let Some(ms) = var("WORKCELL_TRANSFORM_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        cfg.transform_timeout_ms = ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_cell() {
        let cfg = Config::default();
        assert_eq!(cfg.tick_hz, 10.0);
        assert_eq!(cfg.base_frame, "arm1_base_link");
        assert_eq!(cfg.cameras.len(), 10);
        assert_eq!(cfg.cameras[3].name, "logical_camera_bin3");
        assert_eq!(cfg.cameras[3].frame, "logical_camera_bin3_frame");
        cfg.validate().unwrap();
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
tick_hz = 20.0
solve_ik = true

[[cameras]]
name = "logical_camera_bin0"
frame = "bin0_cam"
"#,
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.tick_hz, 20.0);
        assert!(cfg.solve_ik);
        assert_eq!(cfg.standoff_m, 0.10);
        assert_eq!(
            cfg.cameras,
            vec![CameraEntry {
                name: "logical_camera_bin0".into(),
                frame: "bin0_cam".into()
            }]
        );
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn unparsable_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "tick_hz = \"fast\"").unwrap();
        assert!(matches!(load_from(&path), Err(CellError::Config(_))));
    }

    #[test]
    fn config_path_points_to_workcell_dir() {
        let p = config_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.workcell/config.toml"));
    }

    #[test]
    fn overrides_replace_fields() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            overrides(&[
                ("WORKCELL_TICK_HZ", "25"),
                ("WORKCELL_BASE_FRAME", "arm2_base_link"),
                ("WORKCELL_STANDOFF_M", "0.2"),
                ("WORKCELL_TRANSFORM_TIMEOUT_MS", "250"),
            ]),
        );
        assert_eq!(cfg.tick_hz, 25.0);
        assert_eq!(cfg.base_frame, "arm2_base_link");
        assert_eq!(cfg.standoff_m, 0.2);
        assert_eq!(cfg.transform_timeout_ms, 250);
    }

    #[test]
    fn invalid_override_is_ignored() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, overrides(&[("WORKCELL_TICK_HZ", "often")]));
        assert_eq!(cfg.tick_hz, 10.0);
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let zero_rate = Config {
            tick_hz: 0.0,
            ..Config::default()
        };
        assert!(zero_rate.validate().is_err());

        let no_cameras = Config {
            cameras: vec![],
            ..Config::default()
        };
        assert!(no_cameras.validate().is_err());

        let mut duplicate = Config::default();
        duplicate.cameras.push(duplicate.cameras[0].clone());
        assert!(matches!(duplicate.validate(), Err(CellError::Config(msg)) if msg.contains("twice")));
    }

    #[test]
    fn control_loop_config_conversion() {
        let cfg = Config {
            tick_hz: 4.0,
            transform_timeout_ms: 1500,
            ..Config::default()
        };
        let loop_cfg = cfg.control_loop_config();
        assert_eq!(loop_cfg.tick_period, Duration::from_millis(250));
        assert_eq!(loop_cfg.transform_timeout, Duration::from_millis(1500));
        assert_eq!(loop_cfg.cameras.len(), 10);
        assert_eq!(loop_cfg.cameras[8].frame_id, "quality_control_sensor_1_frame");
        assert_eq!(loop_cfg.joint_offset, 1);
    }
}
