//! CrabRecord: network-triggered camera recording
//!
//! A recording session pairs a capture task reading frames from a camera with
//! a persist task encoding them into an MP4 file. The two are joined by an
//! ordered frame queue that ends with exactly one end marker, so every frame
//! captured before a stop lands in the finalized file.
//!
//! # Features
//! - `recording` (default): H.264/MP4 sink via openh264 and muxide
//! - `server` (default): axum HTTP control plane
//! - `camera`: native camera source via nokhwa
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use crabrecord::{
//!     CameraBackend, Mp4Backend, Mp4Settings, RecorderSettings, RecordingStore, ServiceConfig,
//!     SessionRegistry,
//! };
//!
//! let config = ServiceConfig::load_layered(ServiceConfig::default_path())?;
//! let registry = SessionRegistry::new(
//!     RecorderSettings::from(&config),
//!     RecordingStore::open(&config.storage.directory)?,
//!     Arc::new(CameraBackend::new()),
//!     Arc::new(Mp4Backend::new(Mp4Settings::from(&config.recording))),
//! );
//! let filename = registry.start()?;
//! let summary = registry.stop()?;
//! ```
pub mod config;
pub mod errors;
pub mod queue;
pub mod registry;
pub mod session;
pub mod sink;
pub mod source;
pub mod store;
pub mod types;

#[cfg(feature = "recording")]
pub mod recording;

#[cfg(feature = "server")]
pub mod server;

// Testing utilities - synthetic camera and in-memory sink
pub mod testing;

// Re-exports for convenience
pub use config::ServiceConfig;
pub use errors::{RecorderError, Result};
pub use queue::QueueMode;
pub use registry::{RecorderSettings, RegistryStatus, SessionRegistry};
pub use session::{RecordingSession, SessionMonitor, SessionParams};
pub use sink::{FrameSink, SinkBackend, SinkStats};
pub use source::{FrameSource, SourceBackend};
pub use store::RecordingStore;
pub use types::{
    CaptureFormat, Frame, RecordingSummary, Resolution, SessionState, SessionStatus,
};

#[cfg(feature = "camera")]
pub use source::CameraBackend;

#[cfg(feature = "recording")]
pub use recording::{Mp4Backend, Mp4Settings};

/// Initialize logging for the recorder
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("crabrecord=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
