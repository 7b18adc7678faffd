//! Synthetic frames and a camera stand-in for offline testing

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{RecorderError, Result};
use crate::source::{FrameSource, SourceBackend};
use crate::types::{CaptureFormat, Frame, Resolution, SourceRead};

/// Create a gradient RGB24 frame whose content changes with `frame_number`
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> Frame {
    let mut data = vec![0u8; Resolution::new(width, height).rgb_len()];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    Frame::new(frame_number, width, height, data)
}

/// A scripted camera.
///
/// Every knob is optional: by default it produces frames at the requested
/// format forever with no delay.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    frame_limit: Option<u64>,
    clamp_to: Option<Resolution>,
    fail_open: Option<String>,
    fail_after: Option<u64>,
    read_delay: Duration,
    counters: Arc<SourceCounters>,
}

/// Observations shared between a backend and every source it opened
#[derive(Debug, Default)]
pub struct SourceCounters {
    opened: AtomicU64,
    closed: AtomicU64,
    reads: AtomicU64,
}

impl SourceCounters {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report end of stream after `frames` frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Negotiate at most this resolution regardless of the request
    pub fn with_clamp(mut self, width: u32, height: u32) -> Self {
        self.clamp_to = Some(Resolution::new(width, height));
        self
    }

    /// Fail every open with a device error
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.fail_open = Some(message.into());
        self
    }

    /// Fail the read following `frames` successful frames, as if unplugged
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Sleep before each read, like a real device pacing its frames
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn counters(&self) -> Arc<SourceCounters> {
        self.counters.clone()
    }
}

impl SourceBackend for SyntheticBackend {
    fn open(&self, device_index: u32, requested: CaptureFormat) -> Result<Box<dyn FrameSource>> {
        if let Some(ref message) = self.fail_open {
            return Err(RecorderError::Device(format!(
                "camera {} unavailable: {}",
                device_index, message
            )));
        }

        let mut format = requested;
        if let Some(max) = self.clamp_to {
            format.resolution.width = format.resolution.width.min(max.width);
            format.resolution.height = format.resolution.height.min(max.height);
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource {
            format,
            produced: 0,
            frame_limit: self.frame_limit,
            fail_after: self.fail_after,
            read_delay: self.read_delay,
            counters: self.counters.clone(),
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticSource {
    format: CaptureFormat,
    produced: u64,
    frame_limit: Option<u64>,
    fail_after: Option<u64>,
    read_delay: Duration,
    counters: Arc<SourceCounters>,
    closed: bool,
}

impl FrameSource for SyntheticSource {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn read(&mut self) -> Result<SourceRead> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        if self.fail_after == Some(self.produced) {
            return Err(RecorderError::Device("synthetic camera disconnected".to_string()));
        }
        if self.frame_limit == Some(self.produced) {
            return Ok(SourceRead::EndOfStream);
        }

        self.produced += 1;
        Ok(SourceRead::Frame(synthetic_video_frame(
            self.produced,
            self.format.width(),
            self.format.height(),
        )))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
