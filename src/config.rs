//! Configuration management for CrabRecord
//!
//! Provides configuration loading, saving, and validation for the camera,
//! encoder, recordings directory, and HTTP listener.

use crate::errors::RecorderError;
use crate::queue::QueueMode;
use crate::types::CaptureFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `CRABRECORD_SERVER__BIND`
pub const ENV_PREFIX: &str = "CRABRECORD";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub camera: CameraConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// Camera device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Index of the capture device
    pub device_index: u32,
    /// Requested resolution [width, height]; the device may clamp it
    pub resolution: [u32; 2],
    /// Requested frames per second
    pub fps: f64,
}

/// Encoder and pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Write moov before mdat
    pub fast_start: bool,
    /// Capture-to-persist hand-off discipline
    pub queue: QueueMode,
}

/// Recordings directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub directory: String,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Largest accepted upload body in bytes
    pub max_upload_bytes: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: [640, 480],
            fps: 30.0,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            bitrate: 2_500_000,
            fast_start: true,
            queue: QueueMode::Unbounded,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: "recorded_videos".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            recording: RecordingConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl CameraConfig {
    /// The format requested from the device
    pub fn requested_format(&self) -> CaptureFormat {
        CaptureFormat::new(self.resolution[0], self.resolution[1], self.fps)
    }
}

impl ServiceConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RecorderError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| RecorderError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ServiceConfig = toml::from_str(&contents)
            .map_err(|e| RecorderError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the TOML file (if present) and apply `CRABRECORD_*` environment overrides
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| RecorderError::Config(format!("Failed to seed defaults: {}", e)))?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RecorderError::Config(format!("Failed to build config: {}", e)))?;

        let config: ServiceConfig = settings
            .try_deserialize()
            .map_err(|e| RecorderError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RecorderError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RecorderError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RecorderError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| RecorderError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabrecord.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RecorderError> {
        let [width, height] = self.camera.resolution;
        if width == 0 || height == 0 {
            return Err(RecorderError::Config("Invalid camera resolution".to_string()));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(RecorderError::Config(
                "Camera resolution must have even dimensions for YUV420".to_string(),
            ));
        }
        if !(self.camera.fps > 0.0 && self.camera.fps <= 240.0) {
            return Err(RecorderError::Config("Invalid FPS (must be 1-240)".to_string()));
        }
        if self.recording.bitrate == 0 {
            return Err(RecorderError::Config("Bitrate must be positive".to_string()));
        }
        if let QueueMode::Bounded { capacity } = self.recording.queue {
            if capacity == 0 {
                return Err(RecorderError::Config(
                    "Bounded queue capacity must be at least 1".to_string(),
                ));
            }
        }
        if self.storage.directory.trim().is_empty() {
            return Err(RecorderError::Config("Storage directory is empty".to_string()));
        }
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(RecorderError::Config(format!(
                "Invalid bind address: {}",
                self.server.bind
            )));
        }
        Ok(())
    }
}
