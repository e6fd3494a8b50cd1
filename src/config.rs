use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::acquisition::{
    AcquisitionSettings, DEADLINE_SECS, DEFAULT_DESIRED_ACCURACY_M, STAGNATION_RADIUS_M,
    STAGNATION_SECS, STALE_FIX_SECS,
};
use crate::geocode::DEFAULT_GAZETTEER_RADIUS_M;

/// Upper bound for every configured timing
pub const MAX_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeocoderKind {
    Gazetteer,
    Nominatim,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub desired_accuracy_m: f64,
    pub stale_fix_secs: i64,
    pub deadline_secs: i64,
    pub stagnation_radius_m: f64,
    pub stagnation_secs: i64,
    pub geocoder: GeocoderKind,
    pub places_path: Option<PathBuf>,
    pub gazetteer_radius_m: f64,
    pub nominatim_user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            desired_accuracy_m: DEFAULT_DESIRED_ACCURACY_M,
            stale_fix_secs: STALE_FIX_SECS,
            deadline_secs: DEADLINE_SECS,
            stagnation_radius_m: STAGNATION_RADIUS_M,
            stagnation_secs: STAGNATION_SECS,
            geocoder: GeocoderKind::Gazetteer,
            places_path: None,
            gazetteer_radius_m: DEFAULT_GAZETTEER_RADIUS_M,
            nominatim_user_agent: concat!("loctag/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Accuracies and radii are finite and positive
pub fn parse_meters(s: &str) -> Result<f64, String> {
    let meters: f64 = s.trim().parse().map_err(|_| format!("invalid distance '{s}'"))?;
    if valid_meters(meters) {
        Ok(meters)
    } else {
        Err(format!("distance must be a positive number of meters, got {meters}"))
    }
}

fn valid_meters(meters: f64) -> bool {
    meters.is_finite() && meters > 0.0
}

fn valid_secs(secs: i64) -> bool {
    (0..=MAX_SECS).contains(&secs)
}

impl Config {
    pub fn acquisition_settings(&self) -> AcquisitionSettings {
        let seconds = |secs: i64| chrono::Duration::seconds(secs.clamp(0, MAX_SECS));
        AcquisitionSettings {
            desired_accuracy: self.desired_accuracy_m,
            stale_after: seconds(self.stale_fix_secs),
            deadline: seconds(self.deadline_secs),
            stagnation_radius: self.stagnation_radius_m,
            stagnation_window: seconds(self.stagnation_secs),
        }
    }

    /// Replaces out-of-range values with their defaults
    pub fn sanitized(self) -> Self {
        let defaults = Config::default();
        let meters = |name: &str, value: f64, default: f64| {
            if valid_meters(value) {
                value
            } else {
                tracing::warn!(setting = name, value, "out of range, using default");
                default
            }
        };
        let secs = |name: &str, value: i64, default: i64| {
            if valid_secs(value) {
                value
            } else {
                tracing::warn!(setting = name, value, "out of range, using default");
                default
            }
        };

        Config {
            desired_accuracy_m: meters(
                "desired_accuracy_m",
                self.desired_accuracy_m,
                defaults.desired_accuracy_m,
            ),
            stale_fix_secs: secs("stale_fix_secs", self.stale_fix_secs, defaults.stale_fix_secs),
            deadline_secs: secs("deadline_secs", self.deadline_secs, defaults.deadline_secs),
            stagnation_radius_m: meters(
                "stagnation_radius_m",
                self.stagnation_radius_m,
                defaults.stagnation_radius_m,
            ),
            stagnation_secs: secs("stagnation_secs", self.stagnation_secs, defaults.stagnation_secs),
            gazetteer_radius_m: meters(
                "gazetteer_radius_m",
                self.gazetteer_radius_m,
                defaults.gazetteer_radius_m,
            ),
            ..self
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "loctag") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("loctag_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files fall back to defaults, and so do
    /// out-of-range values
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg.sanitized(),
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable config"),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
