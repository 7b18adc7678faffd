//! MP4 writer settings

use serde::{Deserialize, Serialize};

use crate::config::RecordingConfig;

/// Settings applied to every MP4 file the writer opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mp4Settings {
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Enable fast-start for web playback (moov before mdat)
    pub fast_start: bool,
    /// Optional title metadata
    pub title: Option<String>,
}

impl Mp4Settings {
    pub fn new(bitrate: u32) -> Self {
        Self {
            bitrate,
            fast_start: true,
            title: None,
        }
    }

    /// Set the title metadata
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set fast-start mode
    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = enabled;
        self
    }
}

impl Default for Mp4Settings {
    fn default() -> Self {
        Self::new(2_500_000)
    }
}

impl From<&RecordingConfig> for Mp4Settings {
    fn from(config: &RecordingConfig) -> Self {
        Self::new(config.bitrate).with_fast_start(config.fast_start)
    }
}
