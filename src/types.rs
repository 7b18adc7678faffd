//! Core data types shared by the capture and persist sides of a session.

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of one packed RGB24 frame at this resolution
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resolution plus frame rate, either as requested or as negotiated with the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub resolution: Resolution,
    pub fps: f64,
}

impl CaptureFormat {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            resolution: Resolution::new(width, height),
            fps,
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self::new(640, 480, 30.0)
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}fps", self.resolution, self.fps)
    }
}

/// One captured RGB24 image.
///
/// Frames move by value from the source, through the queue, into the sink;
/// there is no `Clone` so each frame has exactly one owner.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    /// Capture order, starting at 1 within a session
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Packed RGB24, `width * height * 3` bytes
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            sequence,
            width,
            height,
            data,
        }
    }

    pub fn from_image(sequence: u64, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(sequence, width, height, image.into_raw())
    }

    /// Reinterpret the buffer as an image; `None` if the buffer is short
    pub fn into_image(self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// True when the buffer length matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.resolution().rgb_len()
    }
}

/// Item carried by the frame queue
#[derive(Debug, PartialEq, Eq)]
pub enum QueueItem {
    Frame(Frame),
    /// No further frames will follow
    End,
}

/// Outcome of a single source read
#[derive(Debug, PartialEq, Eq)]
pub enum SourceRead {
    Frame(Frame),
    EndOfStream,
}

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Stopped,
}

impl SessionState {
    /// States in which a new session may be started
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

/// Snapshot of a session taken while it runs or after it has stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub filename: String,
    pub state: SessionState,
    pub format: CaptureFormat,
    pub frames_captured: u64,
    pub frames_written: u64,
    pub started_at: DateTime<Utc>,
    /// Failure recorded by a background task, if any
    pub failure: Option<String>,
}

/// Result of a cleanly stopped session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub filename: String,
    pub path: PathBuf,
    pub format: CaptureFormat,
    pub frames_captured: u64,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RecordingSummary {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_image_conversion() {
        let image = RgbImage::from_pixel(4, 2, image::Rgb([10, 20, 30]));
        let frame = Frame::from_image(7, image);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.resolution(), Resolution::new(4, 2));
        assert!(frame.is_well_formed());

        let back = frame.into_image().expect("buffer matches dimensions");
        assert_eq!(back.get_pixel(3, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_short_buffer_is_not_well_formed() {
        let frame = Frame::new(1, 4, 4, vec![0; 10]);
        assert!(!frame.is_well_formed());
        assert!(frame.into_image().is_none());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&SessionState::Recording).unwrap();
        assert_eq!(json, "\"recording\"");
        assert!(SessionState::Stopped.is_terminal());
        assert!(!SessionState::Stopping.is_terminal());
    }

    #[test]
    fn test_format_display() {
        assert_eq!(CaptureFormat::new(640, 480, 30.0).to_string(), "640x480@30fps");
    }
}
