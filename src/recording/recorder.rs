//! MP4 frame sink combining the H.264 encoder and the muxide muxer

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use muxide::api::{Metadata, Muxer, MuxerBuilder, VideoCodec};

use super::config::Mp4Settings;
use super::encoder::H264Encoder;
use crate::errors::{RecorderError, Result};
use crate::sink::{FrameSink, SinkBackend, SinkStats};
use crate::types::{CaptureFormat, Frame};

/// Opens H.264/MP4 files for new recordings
#[derive(Debug, Clone, Default)]
pub struct Mp4Backend {
    settings: Mp4Settings,
}

impl Mp4Backend {
    pub fn new(settings: Mp4Settings) -> Self {
        Self { settings }
    }
}

impl SinkBackend for Mp4Backend {
    fn open(&self, path: &Path, format: CaptureFormat) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(Mp4Sink::create(path, format, &self.settings)?))
    }

    fn name(&self) -> &str {
        "mp4"
    }
}

/// Encodes frames to H.264 and muxes them into one MP4 file
pub struct Mp4Sink {
    encoder: H264Encoder,
    muxer: Muxer<BufWriter<File>>,
    path: PathBuf,
    frame_count: u64,
    frame_duration_secs: f64,
}

impl Mp4Sink {
    /// Create the output file and prepare the encoder and muxer.
    ///
    /// The file is removed again if anything after its creation fails.
    pub fn create<P: AsRef<Path>>(
        path: P,
        format: CaptureFormat,
        settings: &Mp4Settings,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !(format.fps.is_finite() && format.fps > 0.0) {
            return Err(RecorderError::Encode(format!(
                "Invalid frame rate {} for {}",
                format.fps,
                path.display()
            )));
        }

        let encoder = H264Encoder::new(
            format.width(),
            format.height(),
            format.fps,
            settings.bitrate,
        )?;

        let file = File::create(&path)
            .map_err(|e| RecorderError::Encode(format!("Failed to create output file: {}", e)))?;

        match Self::build_muxer(BufWriter::new(file), format, settings) {
            Ok(muxer) => {
                log::debug!("Opened {} for {}", path.display(), format);
                Ok(Self {
                    encoder,
                    muxer,
                    path,
                    frame_count: 0,
                    frame_duration_secs: 1.0 / format.fps,
                })
            }
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove {}: {}", path.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    fn build_muxer(
        writer: BufWriter<File>,
        format: CaptureFormat,
        settings: &Mp4Settings,
    ) -> Result<Muxer<BufWriter<File>>> {
        let mut metadata = Metadata::new().with_current_time();
        if let Some(ref title) = settings.title {
            metadata = metadata.with_title(title);
        }

        MuxerBuilder::new(writer)
            .video(VideoCodec::H264, format.width(), format.height(), format.fps)
            .with_fast_start(settings.fast_start)
            .with_metadata(metadata)
            .build()
            .map_err(|e| RecorderError::Encode(format!("Failed to create muxer: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn encoder(&self) -> &H264Encoder {
        &self.encoder
    }
}

impl FrameSink for Mp4Sink {
    fn write(&mut self, frame: Frame) -> Result<()> {
        let encoded = self.encoder.encode(&frame)?;

        let pts = self.frame_count as f64 * self.frame_duration_secs;
        self.muxer
            .write_video(pts, &encoded.data, encoded.is_keyframe)
            .map_err(|e| RecorderError::Encode(format!("Failed to write frame: {}", e)))?;

        self.frame_count += 1;
        log::trace!("Wrote frame {} at pts {:.3}", frame.sequence, pts);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<SinkStats> {
        let this = *self;
        let stats = this.muxer.finish_with_stats().map_err(|e| {
            RecorderError::Encode(format!("Failed to finalize {}: {}", this.path.display(), e))
        })?;

        log::debug!(
            "Finalized {}: {} frames, {:.2}s, {} bytes",
            this.path.display(),
            stats.video_frames,
            stats.duration_secs,
            stats.bytes_written
        );

        Ok(SinkStats {
            frames_written: this.frame_count,
            bytes_written: stats.bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_video_frame;

    #[test]
    fn test_sink_creation() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("create.mp4");
        let sink = Mp4Sink::create(&output, CaptureFormat::new(320, 240, 30.0), &Mp4Settings::default());
        assert!(sink.is_ok(), "Sink should be created successfully");
        assert!(output.exists());
    }

    #[test]
    fn test_sink_encoder_uses_settings() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("rate.mp4");
        let format = CaptureFormat::new(320, 240, 15.0);
        let sink = Mp4Sink::create(&output, format, &Mp4Settings::new(600_000))
            .expect("Sink creation failed");
        assert_eq!(sink.encoder().bitrate(), 600_000);
        assert_eq!(sink.encoder().fps(), 15.0);

        let zero = dir.path().join("zero.mp4");
        let result = Mp4Sink::create(&zero, format, &Mp4Settings::new(0));
        assert!(matches!(result, Err(RecorderError::Encode(_))));
        assert!(!zero.exists());
    }

    #[test]
    fn test_invalid_format_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("odd.mp4");
        let result = Mp4Sink::create(&output, CaptureFormat::new(321, 240, 30.0), &Mp4Settings::default());
        assert!(matches!(result, Err(RecorderError::Encode(_))));
        assert!(!output.exists());

        let result = Mp4Sink::create(&output, CaptureFormat::new(320, 240, 0.0), &Mp4Settings::default());
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_write_and_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frames.mp4");
        let settings = Mp4Settings::default().with_title("Test Recording");
        let mut sink: Box<dyn FrameSink> = Box::new(
            Mp4Sink::create(&output, CaptureFormat::new(320, 240, 30.0), &settings)
                .expect("Sink creation failed"),
        );

        for i in 1..=30 {
            sink.write(synthetic_video_frame(i, 320, 240))
                .expect("Frame write should succeed");
        }

        let stats = sink.finalize().expect("Finalize should succeed");
        assert_eq!(stats.frames_written, 30);
        assert!(stats.bytes_written > 0);

        let metadata = std::fs::metadata(&output).expect("File should exist");
        assert!(metadata.len() > 0);
    }
}
