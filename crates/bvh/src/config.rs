use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// BVH registry configuration.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BvhConfig {
    /// Wall-clock period of the cached-transform refresh, in milliseconds.
    pub refresh_interval_ms: u64,
    /// Query range used when a caller does not supply one.
    pub max_ray_distance: f32,
    /// Reuse one acceleration structure for surfaces with identical geometry.
    pub share_geometry: bool,
    pub ground: GroundProbeConfig,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            max_ray_distance: 1000.0,
            share_geometry: true,
            ground: GroundProbeConfig::default(),
        }
    }
}

/// Ground probe tuning: where the downward ray starts and what counts as floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundProbeConfig {
    /// Height above the feet the probe ray starts from.
    pub ray_offset: f32,
    /// How far below the feet ground is still detected.
    pub max_distance: f32,
    /// Steepest slope, in degrees from horizontal, that is walkable.
    pub max_slope_degrees: f32,
}

impl Default for GroundProbeConfig {
    fn default() -> Self {
        Self {
            ray_offset: 0.5,
            max_distance: 50.0,
            max_slope_degrees: 45.0,
        }
    }
}

impl BvhConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded BVH config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_ms must be positive".into(),
            ));
        }
        if !(self.max_ray_distance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_ray_distance must be positive, got {}",
                self.max_ray_distance
            )));
        }
        let g = &self.ground;
        if !(g.ray_offset >= 0.0) || !g.ray_offset.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "ground.ray_offset must be non-negative, got {}",
                g.ray_offset
            )));
        }
        if !(g.max_distance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "ground.max_distance must be positive, got {}",
                g.max_distance
            )));
        }
        if !(g.max_slope_degrees > 0.0 && g.max_slope_degrees <= 90.0) {
            return Err(ConfigError::Invalid(format!(
                "ground.max_slope_degrees must be in (0, 90], got {}",
                g.max_slope_degrees
            )));
        }
        Ok(())
    }
}
