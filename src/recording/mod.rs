//! MP4 recording backend
//!
//! Frames are encoded with openh264 and muxed into MP4 with muxide.
//!
//! # Example
//! ```rust,ignore
//! use crabrecord::recording::{Mp4Backend, Mp4Settings};
//! use crabrecord::sink::SinkBackend;
//!
//! let backend = Mp4Backend::new(Mp4Settings::new(2_500_000));
//! let mut sink = backend.open(path, CaptureFormat::new(640, 480, 30.0))?;
//!
//! // From the persist task:
//! sink.write(frame)?;
//!
//! // On the end marker:
//! let stats = sink.finalize()?;
//! ```

mod config;
mod encoder;
mod recorder;

pub use config::Mp4Settings;
pub use encoder::{EncodedFrame, H264Encoder};
pub use recorder::{Mp4Backend, Mp4Sink};
