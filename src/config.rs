use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use prefs_model::UserPreferences;
use serde::Deserialize;

use crate::animation::Extent;
use crate::session::SessionVariant;

/// Pixel extents of the simulated window and of the clock laid out inside it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SurfaceConfig {
    pub width: f32,
    pub height: f32,
    pub clock_width: f32,
    pub clock_height: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            clock_width: 640.0,
            clock_height: 320.0,
        }
    }
}

impl SurfaceConfig {
    pub fn container(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    pub fn clock(&self) -> Extent {
        Extent::new(self.clock_width, self.clock_height)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Dream (docked idle) or standalone screensaver.
    pub variant: SessionVariant,
    /// YAML snapshot standing in for the device's content providers.
    pub device_snapshot_path: PathBuf,
    /// Watched preference file; when absent the inline `preferences` apply.
    pub preferences_path: Option<PathBuf>,
    pub preferences: UserPreferences,
    pub surface: SurfaceConfig,
    /// Animation frame interval while the clock is moving.
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            variant: SessionVariant::default(),
            device_snapshot_path: PathBuf::from("device.yaml"),
            preferences_path: None,
            preferences: UserPreferences::default(),
            surface: SurfaceConfig::default(),
            frame_interval: Duration::from_millis(33),
        }
    }
}

impl Configuration {
    /// Parse a config file. Relative paths inside it resolve against the
    /// file's directory.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)?;
        let mut cfg: Self = serde_yaml::from_str(&s)?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.device_snapshot_path.is_relative() {
            self.device_snapshot_path = base.join(&self.device_snapshot_path);
        }
        if let Some(prefs) = self.preferences_path.as_mut() {
            if prefs.is_relative() {
                *prefs = base.join(&*prefs);
            }
        }
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        let surface = &self.surface;
        ensure!(
            surface.width > 0.0 && surface.height > 0.0,
            "surface width and height must be positive"
        );
        ensure!(
            surface.clock_width > 0.0 && surface.clock_height > 0.0,
            "surface clock-width and clock-height must be positive"
        );
        ensure!(
            !self.frame_interval.is_zero(),
            "frame-interval must be greater than zero"
        );
        ensure!(
            !self.device_snapshot_path.as_os_str().is_empty(),
            "device-snapshot-path must not be empty"
        );
        if let Some(prefs) = &self.preferences_path {
            ensure!(
                !prefs.as_os_str().is_empty(),
                "preferences-path must not be empty when set"
            );
        }
        Ok(self)
    }

    /// Current preferences: the watched file when configured, else the inline block.
    pub fn load_preferences(&self) -> Result<UserPreferences> {
        let Some(path) = &self.preferences_path else {
            return Ok(self.preferences.clone());
        };
        read_preferences(path)
    }
}

/// Preferences at `path`; an empty file means every default.
pub fn read_preferences(path: &Path) -> Result<UserPreferences> {
    Ok(read_preference_update(path)?.unwrap_or_default())
}

/// Like [`read_preferences`], but an empty file yields `None`. Editors that
/// truncate before writing leave the file empty for a moment.
pub fn read_preference_update(path: &Path) -> Result<Option<UserPreferences>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read preferences from {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str(&text)
        .map(Some)
        .with_context(|| format!("failed to parse preferences in {}", path.display()))
}
