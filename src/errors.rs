use thiserror::Error;

/// Errors surfaced by the recording pipeline and its control plane.
///
/// Payloads are plain strings so a failure recorded by a background task
/// can be cloned into both the session status and the eventual stop result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    /// Camera unavailable, disconnected, or unsupported configuration
    #[error("Device error: {0}")]
    Device(String),
    /// Destination file cannot be opened, written, or finalized
    #[error("Encode error: {0}")]
    Encode(String),
    /// Start requested while a session is running; carries the active filename
    #[error("Recording already active: {0}")]
    AlreadyActive(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl RecorderError {
    /// True for failures that end a running session.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, RecorderError::Device(_) | RecorderError::Encode(_))
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RecorderError::Device(_) => "device",
            RecorderError::Encode(_) => "encode",
            RecorderError::AlreadyActive(_) => "already_active",
            RecorderError::NotFound(_) => "not_found",
            RecorderError::InvalidRequest(_) => "invalid_request",
            RecorderError::Config(_) => "config",
            RecorderError::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(e: std::io::Error) -> Self {
        RecorderError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
