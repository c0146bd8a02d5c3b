use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::capture::source::SyntheticScene;

const DEFAULT_LOCATION: &str = "Enforcement Zone 4";
const DEFAULT_SPEED_THRESHOLD_KMH: u32 = 40;
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 5;
const DEFAULT_SCENE_WIDTH: u32 = 640;
const DEFAULT_SCENE_HEIGHT: u32 = 480;
const DEFAULT_SCENE_FPS: u32 = 30;
const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    location: Option<String>,
    feed_capacity: Option<usize>,
    detection: Option<DetectionConfigFile>,
    scene: Option<SceneConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    speed_threshold_kmh: Option<u32>,
    update_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SceneConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

/// Resolved daemon configuration: file values, then environment overrides,
/// then validation.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Operator-facing label stamped into violation records.
    pub location: String,
    pub feed_capacity: usize,
    pub detection: DetectionSettings,
    pub scene: SceneSettings,
}

/// Per-tick detection tunables. These are the values an operator can change
/// while a session is running, so the pipeline reads them through
/// [`SharedSettings`] rather than holding a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSettings {
    /// Speeds strictly above this raise a violation.
    pub speed_threshold_kmh: u32,
    /// Telemetry refresh cadence.
    pub update_interval: Duration,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            speed_threshold_kmh: DEFAULT_SPEED_THRESHOLD_KMH,
            update_interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
        }
    }
}

/// Synthetic source geometry for the built-in test scene.
#[derive(Debug, Clone, Copy)]
pub struct SceneSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl SceneSettings {
    pub fn to_scene(self) -> SyntheticScene {
        SyntheticScene {
            width: self.width,
            height: self.height,
            target_fps: self.target_fps,
            ..SyntheticScene::default()
        }
    }
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRAFFICWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let location = file
            .location
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let feed_capacity = file.feed_capacity.unwrap_or(DEFAULT_FEED_CAPACITY);
        let detection = DetectionSettings {
            speed_threshold_kmh: file
                .detection
                .as_ref()
                .and_then(|detection| detection.speed_threshold_kmh)
                .unwrap_or(DEFAULT_SPEED_THRESHOLD_KMH),
            update_interval: Duration::from_secs(
                file.detection
                    .as_ref()
                    .and_then(|detection| detection.update_interval_secs)
                    .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS),
            ),
        };
        let scene = SceneSettings {
            width: file
                .scene
                .as_ref()
                .and_then(|scene| scene.width)
                .unwrap_or(DEFAULT_SCENE_WIDTH),
            height: file
                .scene
                .as_ref()
                .and_then(|scene| scene.height)
                .unwrap_or(DEFAULT_SCENE_HEIGHT),
            target_fps: file
                .scene
                .as_ref()
                .and_then(|scene| scene.target_fps)
                .unwrap_or(DEFAULT_SCENE_FPS),
        };
        Self {
            location,
            feed_capacity,
            detection,
            scene,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(location) = std::env::var("TRAFFICWATCH_LOCATION") {
            if !location.trim().is_empty() {
                self.location = location;
            }
        }
        if let Ok(threshold) = std::env::var("TRAFFICWATCH_SPEED_THRESHOLD_KMH") {
            let kmh: u32 = threshold.parse().map_err(|_| {
                anyhow!("TRAFFICWATCH_SPEED_THRESHOLD_KMH must be an integer km/h value")
            })?;
            self.detection.speed_threshold_kmh = kmh;
        }
        if let Ok(interval) = std::env::var("TRAFFICWATCH_UPDATE_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("TRAFFICWATCH_UPDATE_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.detection.update_interval = Duration::from_secs(seconds);
        }
        if let Ok(capacity) = std::env::var("TRAFFICWATCH_FEED_CAPACITY") {
            let capacity: usize = capacity
                .parse()
                .map_err(|_| anyhow!("TRAFFICWATCH_FEED_CAPACITY must be an integer"))?;
            self.feed_capacity = capacity;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(anyhow!("location must not be empty"));
        }
        if self.detection.speed_threshold_kmh == 0 {
            return Err(anyhow!("speed threshold must be greater than zero"));
        }
        if self.detection.update_interval.is_zero() {
            return Err(anyhow!("update interval must be greater than zero"));
        }
        if self.feed_capacity == 0 {
            return Err(anyhow!("feed capacity must be greater than zero"));
        }
        if self.scene.width == 0 || self.scene.height == 0 {
            return Err(anyhow!("scene dimensions must be greater than zero"));
        }
        if self.scene.target_fps == 0 {
            return Err(anyhow!("scene target_fps must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

// -------------------- Shared runtime settings --------------------

/// Handle to the detection settings shared between the tick loop and the
/// control surface. The tracker reads the threshold fresh every tick, so an
/// update takes effect on the very next frame.
#[derive(Clone, Debug)]
pub struct SharedSettings {
    inner: Arc<RwLock<DetectionSettings>>,
}

impl SharedSettings {
    pub fn new(settings: DetectionSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn speed_threshold_kmh(&self) -> u32 {
        self.read().speed_threshold_kmh
    }

    pub fn update_interval(&self) -> Duration {
        self.read().update_interval
    }

    pub fn snapshot(&self) -> DetectionSettings {
        self.read()
    }

    pub fn set_speed_threshold_kmh(&self, kmh: u32) {
        self.write().speed_threshold_kmh = kmh;
    }

    pub fn set_update_interval(&self, interval: Duration) {
        self.write().update_interval = interval;
    }

    fn read(&self) -> DetectionSettings {
        // Lock poisoning requires a panicking writer; settings writes cannot
        // panic, so recover with the held value.
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DetectionSettings> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(DetectionSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_defaults_fill_missing_sections() {
        let cfg = MonitorConfig::from_file(MonitorConfigFile::default());
        assert_eq!(cfg.location, DEFAULT_LOCATION);
        assert_eq!(cfg.detection.speed_threshold_kmh, 40);
        assert_eq!(cfg.detection.update_interval, Duration::from_secs(5));
        assert_eq!(cfg.feed_capacity, 256);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let file: MonitorConfigFile = toml::from_str(
            r#"
            location = "Gate 12"
            [detection]
            speed_threshold_kmh = 60
            [scene]
            width = 320
            height = 240
            "#,
        )
        .expect("parse");
        let cfg = MonitorConfig::from_file(file);
        assert_eq!(cfg.location, "Gate 12");
        assert_eq!(cfg.detection.speed_threshold_kmh, 60);
        assert_eq!((cfg.scene.width, cfg.scene.height), (320, 240));
        // Unset keys keep their defaults.
        assert_eq!(cfg.scene.target_fps, DEFAULT_SCENE_FPS);
    }

    #[test]
    fn zero_threshold_fails_validation() {
        let mut cfg = MonitorConfig::from_file(MonitorConfigFile::default());
        cfg.detection.speed_threshold_kmh = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn shared_settings_updates_are_visible_to_clones() {
        let settings = SharedSettings::default();
        let reader = settings.clone();
        assert_eq!(reader.speed_threshold_kmh(), 40);

        settings.set_speed_threshold_kmh(20);
        assert_eq!(reader.speed_threshold_kmh(), 20);
    }
}
