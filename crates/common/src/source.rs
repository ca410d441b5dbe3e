//! External collaborator capabilities: sources, decoders, encoders.
//!
//! Codec implementations and container parsing are out of scope for the
//! engine; it consumes them through these traits. Test suites plug in
//! deterministic fakes, production wires hardware or software codecs.

use crate::codec::SampleFormat;
use crate::error::{CodecError, ConfigError};
use crate::frame::{AudioChunk, EncodedSample, VideoFrame};
use crate::types::{SourceId, TimeUs, TrackKind};

/// A demuxed media source: per-track formats, duration, the sorted
/// keyframe-timestamp list, and sequential encoded-sample reads.
///
/// This is deliberately the *only* container knowledge the engine has;
/// the trim optimizer needs nothing beyond the keyframe list and the
/// total duration.
pub trait MediaSource: Send {
    /// Formats of all tracks in this source.
    fn track_formats(&self) -> Vec<SampleFormat>;

    /// Total source duration.
    fn duration(&self) -> TimeUs;

    /// Sorted presentation timestamps of the video track's sync samples.
    /// Empty for sources without video.
    fn keyframe_timestamps(&self) -> Vec<TimeUs>;

    /// Read the next encoded sample of the given track, in decode order.
    fn read_sample(&mut self, kind: TrackKind) -> Option<EncodedSample>;

    /// Reposition a track to the nearest sync sample at or before `target`.
    /// Returns the timestamp actually landed on.
    fn seek_to_keyframe(&mut self, kind: TrackKind, target: TimeUs) -> Result<TimeUs, ConfigError>;

    /// Rewind all tracks to the beginning.
    fn reset(&mut self);
}

/// Opaque video decode capability.
pub trait VideoDecoder: Send {
    /// Human-readable codec identity, reported in export manifests.
    fn name(&self) -> &str;

    /// Feed one encoded sample; returns zero or more decoded frames.
    fn decode(&mut self, sample: &EncodedSample) -> Result<Vec<VideoFrame>, CodecError>;

    /// Drain any frames still buffered inside the decoder.
    fn flush(&mut self) -> Result<Vec<VideoFrame>, CodecError>;
}

/// Opaque audio decode capability.
pub trait AudioDecoder: Send {
    fn name(&self) -> &str;

    fn decode(&mut self, sample: &EncodedSample) -> Result<Vec<AudioChunk>, CodecError>;

    fn flush(&mut self) -> Result<Vec<AudioChunk>, CodecError>;
}

/// Opaque video encode capability.
pub trait VideoEncoder: Send {
    fn name(&self) -> &str;

    /// The sample format this encoder produces.
    fn output_format(&self) -> SampleFormat;

    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedSample>, CodecError>;

    fn flush(&mut self) -> Result<Vec<EncodedSample>, CodecError>;
}

/// Opaque audio encode capability.
pub trait AudioEncoder: Send {
    fn name(&self) -> &str;

    fn output_format(&self) -> SampleFormat;

    fn encode(&mut self, chunk: &AudioChunk) -> Result<Vec<EncodedSample>, CodecError>;

    fn flush(&mut self) -> Result<Vec<EncodedSample>, CodecError>;
}

/// Creates codec instances by format-capability negotiation.
pub trait CodecFactory: Send + Sync {
    fn open_video_decoder(&self, format: &SampleFormat) -> Result<Box<dyn VideoDecoder>, CodecError>;

    fn open_audio_decoder(&self, format: &SampleFormat) -> Result<Box<dyn AudioDecoder>, CodecError>;

    fn open_video_encoder(&self, format: &SampleFormat) -> Result<Box<dyn VideoEncoder>, CodecError>;

    fn open_audio_encoder(&self, format: &SampleFormat) -> Result<Box<dyn AudioEncoder>, CodecError>;

    /// Whether this device can re-encode into the given format. The trim
    /// optimizer consults this before committing to a hybrid plan.
    fn can_encode(&self, format: &SampleFormat) -> bool;
}

/// Turns a still-image reference into a fixed-resolution pixel buffer.
/// Images are then treated as a synthetic video source emitting frames at
/// the configured rate for the assigned duration.
pub trait ImageLoader: Send + Sync {
    fn load(&self, id: &SourceId) -> Result<VideoFrame, ConfigError>;
}

/// Injected registry resolving source references to opened media sources.
/// Never process-global state; each session receives its own provider.
pub trait SourceProvider: Send + Sync {
    fn open(&self, id: &SourceId) -> Result<Box<dyn MediaSource>, ConfigError>;
}

/// The bundle of collaborator capabilities a playback or export session
/// is constructed with.
#[derive(Clone)]
pub struct MediaContext {
    pub sources: std::sync::Arc<dyn SourceProvider>,
    pub codecs: std::sync::Arc<dyn CodecFactory>,
    pub images: std::sync::Arc<dyn ImageLoader>,
}
