//! H.264 encoder wrapper using openh264

use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use crate::errors::{RecorderError, Result};
use crate::types::{Frame, Resolution};

/// H.264 encoder for fixed-size RGB24 frames
pub struct H264Encoder {
    encoder: Encoder,
    resolution: Resolution,
    bitrate: u32,
    fps: f64,
    frame_count: u64,
}

impl H264Encoder {
    /// Create an encoder for `width`x`height` input at `fps`, targeting
    /// `bitrate` bits per second.
    ///
    /// openh264 infers dimensions from each YUV buffer.
    pub fn new(width: u32, height: u32, fps: f64, bitrate: u32) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(RecorderError::Encode(format!(
                "Unsupported frame size {}x{}: dimensions must be even and non-zero",
                width, height
            )));
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(RecorderError::Encode(format!("Invalid frame rate {}", fps)));
        }
        if bitrate == 0 {
            return Err(RecorderError::Encode("Bitrate must be positive".to_string()));
        }

        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(bitrate))
            .max_frame_rate(FrameRate::from_hz(fps as f32));
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| RecorderError::Encode(format!("Failed to create encoder: {}", e)))?;

        log::debug!(
            "H.264 encoder {}x{} at {}fps, target {} bps",
            width,
            height,
            fps,
            bitrate
        );

        Ok(Self {
            encoder,
            resolution: Resolution::new(width, height),
            bitrate,
            fps,
            frame_count: 0,
        })
    }

    /// Encode one frame to Annex B NAL units.
    ///
    /// When rate control skips a frame the encoder is forced to emit an
    /// intra frame instead, so every input produces a sample.
    pub fn encode(&mut self, frame: &Frame) -> Result<EncodedFrame> {
        if frame.resolution() != self.resolution {
            return Err(RecorderError::Encode(format!(
                "Frame dimensions {} don't match encoder {}",
                frame.resolution(),
                self.resolution
            )));
        }
        if !frame.is_well_formed() {
            return Err(RecorderError::Encode(format!(
                "Invalid frame size: expected {} bytes, got {}",
                self.resolution.rgb_len(),
                frame.data.len()
            )));
        }

        let yuv = YUVBuffer::from_vec(
            rgb_to_yuv420(&frame.data, self.resolution),
            self.resolution.width as usize,
            self.resolution.height as usize,
        );

        let mut encoded = self.encode_yuv(&yuv)?;
        if encoded.data.is_empty() {
            log::debug!("Encoder skipped frame {}, forcing intra frame", frame.sequence);
            self.encoder.force_intra_frame();
            encoded = self.encode_yuv(&yuv)?;
        }
        if encoded.data.is_empty() {
            return Err(RecorderError::Encode(format!(
                "Encoder produced no output for frame {}",
                frame.sequence
            )));
        }

        self.frame_count += 1;
        Ok(encoded)
    }

    fn encode_yuv(&mut self, yuv: &YUVBuffer) -> Result<EncodedFrame> {
        let bitstream = self
            .encoder
            .encode(yuv)
            .map_err(|e| RecorderError::Encode(format!("Encoding failed: {}", e)))?;

        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);

        Ok(EncodedFrame {
            data: bitstream.to_vec(),
            is_keyframe,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Target bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

/// Result of encoding a single frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded H.264 data in Annex B format (with start codes)
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// Convert packed RGB24 to planar YUV420 (BT.601, limited range).
///
/// Chroma is taken from the average of each 2x2 block.
fn rgb_to_yuv420(rgb: &[u8], resolution: Resolution) -> Vec<u8> {
    let w = resolution.width as usize;
    let h = resolution.height as usize;
    let (cw, ch) = (w / 2, h / 2);

    let mut yuv = vec![0u8; w * h + cw * ch * 2];
    let (y_plane, uv_planes) = yuv.split_at_mut(w * h);
    let (u_plane, v_plane) = uv_planes.split_at_mut(cw * ch);

    let pixel = |x: usize, y: usize| {
        let i = (y * w + x) * 3;
        (rgb[i] as i32, rgb[i + 1] as i32, rgb[i + 2] as i32)
    };

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = pixel(x, y);
            y_plane[y * w + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;
        }
    }

    for by in 0..ch {
        for bx in 0..cw {
            let (mut r, mut g, mut b) = (0, 0, 0);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (pr, pg, pb) = pixel(bx * 2 + dx, by * 2 + dy);
                r += pr;
                g += pg;
                b += pb;
            }
            let (r, g, b) = (r / 4, g / 4, b / 4);
            let idx = by * cw + bx;
            u_plane[idx] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            v_plane[idx] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
        }
    }

    yuv
}
