//! Persist side of a session.

use crate::errors::Result;
use crate::types::{CaptureFormat, Frame};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Totals reported once a sink has been finalized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkStats {
    pub frames_written: u64,
    pub bytes_written: u64,
}

/// An open destination that accepts frames in order
pub trait FrameSink: Send {
    /// Append one frame. Frames are never reordered or dropped.
    fn write(&mut self, frame: Frame) -> Result<()>;

    /// Flush encoder state and close the file.
    ///
    /// Afterwards the file is complete and independently readable.
    fn finalize(self: Box<Self>) -> Result<SinkStats>;
}

/// Opens destinations for new recordings
pub trait SinkBackend: Send + Sync {
    /// Open `path` for frames in the negotiated `format`
    fn open(&self, path: &Path, format: CaptureFormat) -> Result<Box<dyn FrameSink>>;

    fn name(&self) -> &str;
}
