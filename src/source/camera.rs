use crate::errors::{RecorderError, Result};
use crate::types::{CaptureFormat, Frame, SourceRead};
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat as NokhwaFormat, CameraIndex, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution as NokhwaResolution,
    },
    Camera,
};
use serde::Serialize;

use super::{FrameSource, SourceBackend};

/// A camera as reported by the platform
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: String,
    pub name: String,
    pub description: String,
}

/// List available cameras with the platform's native backend
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let cameras = query(ApiBackend::Auto)
        .map_err(|e| RecorderError::Device(format!("Failed to query cameras: {}", e)))?;

    Ok(cameras
        .into_iter()
        .map(|info| DeviceInfo {
            index: info.index().to_string(),
            name: info.human_name(),
            description: info.description().to_string(),
        })
        .collect())
}

/// Opens native cameras through nokhwa
#[derive(Debug, Default, Clone)]
pub struct CameraBackend;

impl CameraBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SourceBackend for CameraBackend {
    fn open(&self, device_index: u32, requested: CaptureFormat) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(CameraSource::open(device_index, requested)?))
    }

    fn name(&self) -> &str {
        "nokhwa"
    }
}

/// An open nokhwa camera with its stream running
pub struct CameraSource {
    camera: Camera,
    format: CaptureFormat,
    open: bool,
}

impl CameraSource {
    /// Open the device and start its stream.
    ///
    /// The request uses the closest supported MJPEG mode; the device's
    /// actual mode is reported through [`FrameSource::format`].
    pub fn open(device_index: u32, requested: CaptureFormat) -> Result<Self> {
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            NokhwaFormat::new(
                NokhwaResolution::new(requested.width(), requested.height()),
                FrameFormat::MJPEG,
                requested.fps.round().max(1.0) as u32,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(device_index), requested_format)
            .map_err(|e| RecorderError::Device(format!("Failed to initialize camera: {}", e)))?;

        camera
            .open_stream()
            .map_err(|e| RecorderError::Device(format!("Failed to start stream: {}", e)))?;

        let negotiated = camera.camera_format();
        let format = CaptureFormat::new(
            negotiated.resolution().width_x,
            negotiated.resolution().height_y,
            negotiated.frame_rate() as f64,
        );

        if format != requested {
            log::info!(
                "Camera {} negotiated {} (requested {})",
                device_index,
                format,
                requested
            );
        }

        Ok(Self {
            camera,
            format,
            open: true,
        })
    }
}

// SAFETY: a CameraSource is owned by exactly one thread at a time; it is
// opened on the control thread and then moved into the capture task.
unsafe impl Send for CameraSource {}

impl FrameSource for CameraSource {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn read(&mut self) -> Result<SourceRead> {
        if !self.open {
            return Ok(SourceRead::EndOfStream);
        }

        let buffer = self
            .camera
            .frame()
            .map_err(|e| RecorderError::Device(format!("Failed to capture frame: {}", e)))?;

        let resolution = buffer.resolution();
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| RecorderError::Device(format!("Failed to decode frame: {}", e)))?;

        Ok(SourceRead::Frame(Frame::new(
            0,
            resolution.width_x,
            resolution.height_y,
            decoded.into_raw(),
        )))
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.camera
            .stop_stream()
            .map_err(|e| RecorderError::Device(format!("Failed to stop stream: {}", e)))
    }
}
