//! Frames and samples: the data flowing between pipeline stages.

use crate::codec::{AudioCodec, VideoCodec};
use crate::types::{Resolution, TimeUs};

/// A decoded video frame (RGBA8 pixel data plus timing).
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// RGBA8 pixel data (width * height * 4 bytes).
    pub data: Vec<u8>,
    /// Frame dimensions.
    pub resolution: Resolution,
    /// Presentation timestamp, local to the producing source.
    pub pts: TimeUs,
}

impl VideoFrame {
    /// Create a frame filled with a single RGBA color.
    pub fn solid(resolution: Resolution, rgba: [u8; 4], pts: TimeUs) -> Self {
        let mut data = Vec::with_capacity(resolution.rgba_byte_size());
        for _ in 0..resolution.pixel_count() {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            resolution,
            pts,
        }
    }
}

/// A block of decoded audio samples.
#[derive(Clone, Debug)]
pub struct AudioChunk {
    /// Interleaved f32 samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Presentation timestamp of the first sample.
    pub pts: TimeUs,
}

impl AudioChunk {
    /// Duration covered by this chunk.
    pub fn duration(&self) -> TimeUs {
        if self.sample_rate == 0 || self.channels == 0 {
            return TimeUs::ZERO;
        }
        let frames = self.samples.len() as i64 / self.channels as i64;
        TimeUs(frames * 1_000_000 / self.sample_rate as i64)
    }
}

/// An encoded sample as it moves between demuxer, encoder, and muxer.
#[derive(Clone, Debug)]
pub struct EncodedSample {
    /// Encoded payload bytes.
    pub data: Vec<u8>,
    /// Presentation timestamp.
    pub pts: TimeUs,
    /// Decode timestamp.
    pub dts: TimeUs,
    /// Whether this is a sync sample (keyframe).
    pub is_keyframe: bool,
}

/// Flags accompanying a sample write.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleFlags {
    pub keyframe: bool,
}

/// Timing info handed to the muxer alongside sample bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SampleTiming {
    /// Presentation timestamp in the output timeline.
    pub pts: TimeUs,
    /// Sample flags (keyframe etc.).
    pub flags: SampleFlags,
    /// Payload size in bytes.
    pub size: usize,
}

impl SampleTiming {
    pub fn new(pts: TimeUs, keyframe: bool, size: usize) -> Self {
        Self {
            pts,
            flags: SampleFlags { keyframe },
            size,
        }
    }
}

/// Video stream facts extracted by the source demuxer.
#[derive(Clone, Debug)]
pub struct VideoStreamInfo {
    pub codec: VideoCodec,
    pub resolution: Resolution,
    pub frame_rate: crate::types::Rational,
    pub duration: TimeUs,
}

/// Audio stream facts extracted by the source demuxer.
#[derive(Clone, Debug)]
pub struct AudioStreamInfo {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: TimeUs,
}
