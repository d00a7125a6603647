//! Configuration file handling for facecam.
//!
//! Loads configuration from `<config dir>/facecam/config.toml` or a custom path.
//! Command-line flags override what is loaded here.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::{AnalysisConfig, DeviceMap, LensFacing, Resolution, Rotation, ZoomRatio};
use crate::torch::{TorchSelection, DEFAULT_LEDS_DIR};

/// Camera backend used by `run` and `list-cameras`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Generated test pattern with bright square markers
    #[default]
    Synthetic,
    /// Webcams through nokhwa (requires the `native` feature)
    Native,
}

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub torch: TorchConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: Backend,
    pub lens: LensFacing,
    pub zoom: f32,
    /// Device index used for the front lens when the backend reports no facing
    pub front_device: Option<u32>,
    pub back_device: Option<u32>,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Mirror the front lens horizontally
    pub mirror: bool,
    /// Clockwise degrees that turn the sensor image upright
    pub rotation: i32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            lens: LensFacing::Front,
            zoom: ZoomRatio::MIN,
            front_device: Some(0),
            back_device: Some(1),
            fps: 30,
            width: Resolution::LOW.width,
            height: Resolution::LOW.height,
            mirror: true,
            rotation: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub enabled: bool,
    pub target_width: u32,
    pub target_height: u32,
    /// YuNet ONNX model; the marker detector is used when unset
    pub model: Option<PathBuf>,
    pub min_face_size: u32,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            enabled: true,
            target_width: Resolution::LOW.width,
            target_height: Resolution::LOW.height,
            model: None,
            min_face_size: 40,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TorchConfig {
    pub selection: TorchSelection,
    pub leds_dir: PathBuf,
}

impl Default for TorchConfig {
    fn default() -> Self {
        Self {
            selection: TorchSelection::default(),
            leds_dir: PathBuf::from(DEFAULT_LEDS_DIR),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub status_bar: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { status_bar: true }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        ZoomRatio::new(camera.zoom).map_err(ConfigError::Invalid)?;
        if !(1..=120).contains(&camera.fps) {
            return Err(ConfigError::Invalid(format!(
                "camera.fps must be between 1 and 120, got {}",
                camera.fps
            )));
        }
        if camera.width == 0 || camera.height == 0 {
            return Err(ConfigError::Invalid(
                "camera.width and camera.height must be greater than 0".to_string(),
            ));
        }
        if camera.rotation.rem_euclid(90) != 0 {
            return Err(ConfigError::Invalid(format!(
                "camera.rotation must be a multiple of 90, got {}",
                camera.rotation
            )));
        }
        let analysis = &self.analysis;
        if analysis.target_width == 0 || analysis.target_height == 0 {
            return Err(ConfigError::Invalid(
                "analysis.target_width and analysis.target_height must be greater than 0"
                    .to_string(),
            ));
        }
        if analysis.min_face_size < 20 {
            return Err(ConfigError::Invalid(format!(
                "analysis.min_face_size must be at least 20, got {}",
                analysis.min_face_size
            )));
        }
        Ok(())
    }

    pub fn zoom(&self) -> ZoomRatio {
        ZoomRatio::clamped(self.camera.zoom)
    }

    pub fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.camera.rotation)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.camera.width,
            height: self.camera.height,
        }
    }

    pub fn device_map(&self) -> DeviceMap {
        DeviceMap {
            front: self.camera.front_device,
            back: self.camera.back_device,
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            target_resolution: Resolution {
                width: self.analysis.target_width,
                height: self.analysis.target_height,
            },
            ..AnalysisConfig::default()
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("facecam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/facecam/config.toml")
        })
}

/// Contents written by `facecam config init`.
pub const DEFAULT_CONFIG: &str = r#"# facecam configuration

[camera]
# synthetic or native
backend = "synthetic"
# front or back
lens = "front"
zoom = 1.0
front_device = 0
back_device = 1
fps = 30
width = 320
height = 240
mirror = true
# clockwise degrees that turn the sensor image upright: 0, 90, 180 or 270
rotation = 0

[analysis]
enabled = true
target_width = 320
target_height = 240
# model = "/path/to/face_detection_yunet_2023mar.onnx"
min_face_size = 40

[torch]
# capability-query or first-listed
selection = "capability-query"
leds_dir = "/sys/class/leds"

[ui]
status_bar = true
"#;
