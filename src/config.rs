use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::error::{Error, Result};
use crate::filter::FilterConfig;
use crate::session::SessionConfig;
use crate::source::SourceKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub min_distance_m: f64,
    pub max_drift_m: f64,
    pub tick_interval_ms: u64,
    pub default_source: SourceKind,
    /// Playback rate for trace replays; 0 replays without delays.
    pub replay_speed: f64,
    pub save_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        let filter = FilterConfig::default();
        Self {
            min_distance_m: filter.min_distance_m,
            max_drift_m: filter.max_drift_m,
            tick_interval_ms: 1000,
            default_source: SourceKind::Positional,
            replay_speed: 1.0,
            save_history: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.min_distance_m.is_finite() || self.min_distance_m < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min_distance_m must be a non-negative number, got {}",
                self.min_distance_m
            )));
        }
        if !self.max_drift_m.is_finite() || self.max_drift_m <= self.min_distance_m {
            return Err(Error::InvalidConfig(format!(
                "max_drift_m must be greater than min_distance_m ({}), got {}",
                self.min_distance_m, self.max_drift_m
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if !self.replay_speed.is_finite() || self.replay_speed < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "replay_speed must be zero or positive, got {}",
                self.replay_speed
            )));
        }
        Ok(())
    }

    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            min_distance_m: self.min_distance_m,
            max_drift_m: self.max_drift_m,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            filter: cfg.filter(),
            tick_interval: Duration::from_millis(cfg.tick_interval_ms),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("runtrack_config.json"));
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
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) if cfg.validate().is_ok() => cfg,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "ignoring unusable config file; using defaults");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<()> {
        cfg.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            min_distance_m: 1.0,
            max_drift_m: 30.0,
            tick_interval_ms: 250,
            default_source: SourceKind::Pedometric,
            replay_speed: 0.0,
            save_history: false,
        };
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("absent.json"));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_drift_m": 80.0, "default_source": "pedometric" }"#)
            .unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.max_drift_m, 80.0);
        assert_eq!(cfg.default_source, SourceKind::Pedometric);
        assert_eq!(cfg.min_distance_m, 2.0);
    }

    #[test]
    fn invalid_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "min_distance_m": 60.0, "max_drift_m": 50.0 }"#).unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }

    #[test]
    fn validate_rejects_bad_thresholds() {
        let bad = Config {
            max_drift_m: 1.0,
            ..Config::default()
        };
        assert_matches!(bad.validate(), Err(Error::InvalidConfig(_)));

        let bad = Config {
            tick_interval_ms: 0,
            ..Config::default()
        };
        assert_matches!(bad.validate(), Err(Error::InvalidConfig(_)));

        let bad = Config {
            min_distance_m: f64::NAN,
            ..Config::default()
        };
        assert_matches!(bad.validate(), Err(Error::InvalidConfig(_)));
    }

    #[test]
    fn session_config_from_config() {
        let cfg = Config {
            tick_interval_ms: 500,
            ..Config::default()
        };
        let session = SessionConfig::from(&cfg);
        assert_eq!(session.tick_interval, Duration::from_millis(500));
        assert_eq!(session.filter, FilterConfig::default());
    }
}
