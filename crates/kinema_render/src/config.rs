//! Render configuration.

use std::path::{Path, PathBuf};

use kinema_math::Color;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a [`RenderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read render config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse render config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid render config: {0}")]
    Invalid(String),
}

/// How rectangle lights are integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaLightMode {
    /// Sampled through the reservoir like every other light
    #[default]
    Stochastic,
    /// Diffuse response integrated in closed form with LTC
    Ltc,
}

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Samples per pixel for anti-aliasing
    pub samples_per_pixel: u32,
    /// Light candidates streamed through the reservoir per sample
    pub ris_candidates: u32,
    /// Background color when the camera ray doesn't hit anything
    pub background: Color,
    /// Distance mapped to depth 1.0
    pub far_plane: f32,
    pub area_light_mode: AreaLightMode,
    /// Offset secondary-ray origins with the shadow-terminator correction
    pub shadow_terminator: bool,
    /// Bucket edge length in pixels
    pub bucket_size: u32,
    /// Frame number; seeds the per-pixel hash
    pub frame_index: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            samples_per_pixel: 16,
            ris_candidates: 4,
            background: Color::ZERO,
            far_plane: 1000.0,
            area_light_mode: AreaLightMode::Stochastic,
            shadow_terminator: true,
            bucket_size: 64,
            frame_index: 0,
        }
    }
}

impl RenderConfig {
    /// Parse and validate a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RenderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        log::info!(
            "Loaded render config from {:?}: {}x{}, {} spp",
            path,
            config.width,
            config.height,
            config.samples_per_pixel
        );
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "image size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.samples_per_pixel == 0 {
            return Err(ConfigError::Invalid("samples_per_pixel must be at least 1".into()));
        }
        if self.ris_candidates == 0 {
            return Err(ConfigError::Invalid("ris_candidates must be at least 1".into()));
        }
        if self.bucket_size == 0 {
            return Err(ConfigError::Invalid("bucket_size must be at least 1".into()));
        }
        if !(self.far_plane > 0.0 && self.far_plane.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "far_plane must be positive and finite, got {}",
                self.far_plane
            )));
        }
        Ok(())
    }

    /// Depth in `[0, 1]` for a hit at distance `t`.
    #[inline]
    pub fn normalized_depth(&self, t: f32) -> f32 {
        (t / self.far_plane).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RenderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RenderConfig::from_json_str(
            r#"{ "width": 32, "height": 16, "area_light_mode": "ltc", "background": [0.1, 0.2, 0.3] }"#,
        )
        .unwrap();
        assert_eq!(config.width, 32);
        assert_eq!(config.height, 16);
        assert_eq!(config.area_light_mode, AreaLightMode::Ltc);
        assert_eq!(config.background, Color::new(0.1, 0.2, 0.3));
        assert_eq!(config.samples_per_pixel, RenderConfig::default().samples_per_pixel);
    }

    #[test]
    fn test_json_round_trip() {
        let config = RenderConfig {
            frame_index: 9,
            shadow_terminator: false,
            ..Default::default()
        };
        let text = config.to_json_string().unwrap();
        assert_eq!(RenderConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(matches!(
            RenderConfig::from_json_str(r#"{ "width": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RenderConfig::from_json_str(r#"{ "far_plane": -1.0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RenderConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = RenderConfig::load("/nonexistent/kinema/render.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_normalized_depth() {
        let config = RenderConfig {
            far_plane: 10.0,
            ..Default::default()
        };
        assert_eq!(config.normalized_depth(5.0), 0.5);
        assert_eq!(config.normalized_depth(50.0), 1.0);
    }
}
