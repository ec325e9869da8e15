//! Configuration Vault – reads/writes `~/.navigator/config.toml`.
//!
//! Every field is optional in the file; missing values take the vehicle
//! defaults.  `NAVIGATOR_*` environment variables override the file.

use std::fs;
use std::path::{Path, PathBuf};

use navigator_hal::DynamicsCoefficients;
use navigator_kernel::FilterConfig;
use navigator_perception::TrackerConfig;
use navigator_runtime::ControlCycleConfig;
use navigator_runtime::control_cycle::DEFAULT_FALLBACK_ALERT_THRESHOLD;
use navigator_types::{DEFAULT_FRAME_ID, NavError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Persisted operator configuration.
///
/// Scalar fields come first so the file serialises with top-level keys
/// ahead of the `[tracker]`, `[filter]` and `[dynamics]` tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Frame identifier stamped on every filtered command.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Consecutive solver fallbacks before a safety alert is raised.
    #[serde(default = "default_fallback_alert_threshold")]
    pub fallback_alert_threshold: usize,

    /// Buffer size of the input channel and of each output bus topic.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub dynamics: DynamicsCoefficients,
}

fn default_frame_id() -> String {
    DEFAULT_FRAME_ID.to_string()
}
fn default_fallback_alert_threshold() -> usize {
    DEFAULT_FALLBACK_ALERT_THRESHOLD
}
fn default_bus_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_id: default_frame_id(),
            fallback_alert_threshold: default_fallback_alert_threshold(),
            bus_capacity: default_bus_capacity(),
            tracker: TrackerConfig::default(),
            filter: FilterConfig::default(),
            dynamics: DynamicsCoefficients::default(),
        }
    }
}

impl Config {
    /// The part of the configuration the control cycle consumes.
    pub fn control_cycle(&self) -> ControlCycleConfig {
        ControlCycleConfig {
            tracker: self.tracker,
            filter: self.filter,
            dynamics: self.dynamics,
            frame_id: self.frame_id.clone(),
            fallback_alert_threshold: self.fallback_alert_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), NavError> {
        if self.bus_capacity == 0 {
            return Err(NavError::InvalidConfig("bus_capacity must be at least 1".into()));
        }
        self.control_cycle().validate()
    }
}

/// Return the path to `~/.navigator/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".navigator").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, NavError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        NavError::InvalidConfig(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| NavError::Parsing(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Resolve the effective configuration: file (or defaults when absent), then
/// environment overrides, then validation.
pub fn resolve(path: &Path) -> Result<Config, NavError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Apply `NAVIGATOR_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `NAVIGATOR_KAPPA` | `filter.kappa` |
/// | `NAVIGATOR_SAFETY_RADIUS` | `tracker.safety_radius` |
/// | `NAVIGATOR_TRACKING_RADIUS` | `tracker.radius` |
/// | `NAVIGATOR_FRAME_ID` | `frame_id` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = parse_override(&lookup, "NAVIGATOR_KAPPA") {
        cfg.filter.kappa = v;
    }
    if let Some(v) = parse_override(&lookup, "NAVIGATOR_SAFETY_RADIUS") {
        cfg.tracker.safety_radius = v;
    }
    if let Some(v) = parse_override(&lookup, "NAVIGATOR_TRACKING_RADIUS") {
        cfg.tracker.radius = v;
    }
    if let Some(v) = lookup("NAVIGATOR_FRAME_ID") {
        cfg.frame_id = v;
    }
}

fn parse_override(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<f64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring unparsable override");
            None
        }
    }
}

/// Save the config to a specific path, creating parent directories.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), NavError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            NavError::InvalidConfig(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = to_toml(cfg)?;
    fs::write(path, raw).map_err(|e| {
        NavError::InvalidConfig(format!("failed to write config at {}: {e}", path.display()))
    })
}

pub fn to_toml(cfg: &Config) -> Result<String, NavError> {
    toml::to_string_pretty(cfg)
        .map_err(|e| NavError::Parsing(format!("failed to serialise config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
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
    fn config_path_points_to_navigator_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".navigator"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("navigator.toml");
        fs::write(
            &path,
            "frame_id = \"auv/base_link\"\n\n[filter]\nkappa = 4.0\n\n[dynamics]\nmass = 2000.0\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.frame_id, "auv/base_link");
        assert_eq!(cfg.filter.kappa, 4.0);
        assert_eq!(cfg.filter.solver, FilterConfig::default().solver);
        assert_eq!(cfg.dynamics.mass, 2000.0);
        assert_eq!(cfg.dynamics.yaw_inertia, DynamicsCoefficients::default().yaw_inertia);
        assert_eq!(cfg.tracker, TrackerConfig::default());
        assert_eq!(cfg.bus_capacity, 1024);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[filter\nkappa = ").expect("write");
        assert!(matches!(load_from(&path), Err(NavError::Parsing(_))));
    }

    #[test]
    fn resolve_rejects_invalid_values() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("navigator.toml");
        fs::write(&path, "[filter]\nkappa = -1.0\n").expect("write");
        assert!(matches!(resolve(&path), Err(NavError::InvalidConfig(_))));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup_from(&[
                ("NAVIGATOR_KAPPA", "7.5"),
                ("NAVIGATOR_SAFETY_RADIUS", " 2 "),
                ("NAVIGATOR_TRACKING_RADIUS", "25"),
                ("NAVIGATOR_FRAME_ID", "auv/base_link"),
            ]),
        );
        assert_eq!(cfg.filter.kappa, 7.5);
        assert_eq!(cfg.tracker.safety_radius, 2.0);
        assert_eq!(cfg.tracker.radius, 25.0);
        assert_eq!(cfg.frame_id, "auv/base_link");
    }

    #[test]
    fn unparsable_override_is_ignored() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, lookup_from(&[("NAVIGATOR_KAPPA", "fast")]));
        assert_eq!(cfg.filter.kappa, FilterConfig::default().kappa);
    }

    #[test]
    fn apply_env_overrides_reads_process_environment() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("NAVIGATOR_TRACKING_RADIUS", "42") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tracker.radius, 42.0);
        unsafe { std::env::remove_var("NAVIGATOR_TRACKING_RADIUS") };
    }

    #[test]
    fn control_cycle_config_carries_every_field() {
        let cfg = Config {
            frame_id: "auv/base_link".into(),
            fallback_alert_threshold: 9,
            ..Config::default()
        };
        let cycle = cfg.control_cycle();
        assert_eq!(cycle.frame_id, "auv/base_link");
        assert_eq!(cycle.fallback_alert_threshold, 9);
        assert_eq!(cycle.filter, cfg.filter);
        assert_eq!(cycle.tracker, cfg.tracker);
        assert_eq!(cycle.dynamics, cfg.dynamics);
    }

    #[test]
    fn zero_bus_capacity_is_invalid() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }
}
