//! Codec and container format identifiers.

use serde::{Deserialize, Serialize};

use crate::types::{Rational, Resolution, TrackKind};

/// Video codec identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
    Av1,
    /// Uncompressed RGBA frames (synthetic sources, test fixtures).
    RawRgba,
}

/// Audio codec identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Opus,
    Mp3,
    /// Uncompressed PCM samples.
    RawPcm,
}

/// Output container format.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerFormat {
    #[default]
    Mp4,
}

/// Sample format of one track, as negotiated with the muxer.
///
/// This is the only format-level fact the engine needs from a container:
/// whether the muxer can take a track's samples verbatim (transmux) or
/// the track must go through decode/encode first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SampleFormat {
    Video {
        codec: VideoCodec,
        resolution: Resolution,
        frame_rate: Rational,
    },
    Audio {
        codec: AudioCodec,
        sample_rate: u32,
        channels: u16,
    },
}

impl SampleFormat {
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Video { .. } => TrackKind::Video,
            Self::Audio { .. } => TrackKind::Audio,
        }
    }

    /// Frame rate for video formats; `None` for audio.
    pub fn frame_rate(&self) -> Option<Rational> {
        match self {
            Self::Video { frame_rate, .. } => Some(*frame_rate),
            Self::Audio { .. } => None,
        }
    }
}
