//! The `Muxer` trait, the single seam between the export pipeline and
//! concrete container writers.
//!
//! Export code only ever sees this trait; the MP4 implementation lives in
//! [`crate::mp4`] and the test double in [`crate::recording`].

use splice_common::{SampleFormat, SampleTiming, TimeUs, TrackKind};

use crate::error::MuxResult;

/// Format of one output track, as handed to [`Muxer::add_track`].
#[derive(Clone, Debug, PartialEq)]
pub struct TrackFormat {
    /// Negotiated sample format (codec, resolution/rate).
    pub sample: SampleFormat,
    /// Codec private data: length-prefixed SPS+PPS for H.264/H.265,
    /// AudioSpecificConfig for AAC. Empty when the codec needs none or a
    /// default record is acceptable.
    pub codec_private: Vec<u8>,
}

impl TrackFormat {
    pub fn new(sample: SampleFormat) -> Self {
        Self {
            sample,
            codec_private: Vec::new(),
        }
    }

    pub fn with_codec_private(mut self, data: Vec<u8>) -> Self {
        self.codec_private = data;
        self
    }

    pub fn kind(&self) -> TrackKind {
        self.sample.kind()
    }
}

/// Opaque handle to a registered track.
///
/// Tokens are stable for the muxer's lifetime and carry the track kind so
/// callers can route kind-specific logic (e.g. only the video token goes
/// through frame-blocking checks) without asking the muxer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrackToken {
    id: u32,
    kind: TrackKind,
}

impl TrackToken {
    pub(crate) fn new(id: u32, kind: TrackKind) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }
}

/// Container-level metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataEntry {
    /// Display orientation in degrees clockwise (0, 90, 180, 270).
    Rotation(u16),
    /// Presentation trim: the first `TimeUs` of the leading video
    /// keyframe run is cut via the container's edit list, so a transmux
    /// that had to start at an earlier keyframe still presents from the
    /// requested trim point.
    TrimStart(TimeUs),
}

/// Abstract container writer.
///
/// Contract:
/// - `write_sample` preserves input ordering per track;
/// - after a deliberate per-track block decision (see
///   [`crate::recording::RecordingMuxer`]) writes are silent no-ops, not
///   errors, so pipelines under test do not need failure-path plumbing;
/// - `close` must flush and finalize the container even if an upstream
///   error occurred, unless the muxer itself is unrecoverably broken, in
///   which case it returns [`crate::error::MuxError::Broken`].
pub trait Muxer: Send {
    /// Register a track. Must be called before the first `write_sample`.
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<TrackToken>;

    /// Append one encoded sample to a track.
    fn write_sample(
        &mut self,
        token: &TrackToken,
        data: &[u8],
        timing: SampleTiming,
    ) -> MuxResult<()>;

    /// Attach container-level metadata. Valid until `close`.
    fn add_metadata(&mut self, entry: MetadataEntry) -> MuxResult<()>;

    /// Finalize and flush the container.
    fn close(&mut self) -> MuxResult<()>;
}
