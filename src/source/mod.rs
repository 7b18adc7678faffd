//! Camera side of a session.
//!
//! A [`SourceBackend`] opens a device and negotiates its format; the
//! resulting [`FrameSource`] is moved into the capture task and read until
//! the session is cancelled or the device reports end of stream.

#[cfg(feature = "camera")]
mod camera;

#[cfg(feature = "camera")]
pub use camera::{list_devices, CameraBackend, CameraSource, DeviceInfo};

use crate::errors::Result;
use crate::types::{CaptureFormat, SourceRead};

/// An opened capture device
pub trait FrameSource: Send {
    /// Format the device actually delivers, which may differ from the request
    fn format(&self) -> CaptureFormat;

    /// Block until the next frame is available.
    ///
    /// No timeout is applied; a stalled device stalls the caller.
    fn read(&mut self) -> Result<SourceRead>;

    /// Release the device. Called exactly once by the capture task.
    fn close(&mut self) -> Result<()>;
}

/// Opens capture devices
pub trait SourceBackend: Send + Sync {
    /// Open `device_index` with a best-effort request for `requested`
    fn open(&self, device_index: u32, requested: CaptureFormat) -> Result<Box<dyn FrameSource>>;

    /// Human-readable backend name for logs
    fn name(&self) -> &str;
}
