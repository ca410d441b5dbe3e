//! Recording muxer test double.
//!
//! Records every track, sample, and metadata entry instead of writing a
//! container, and can be told to "block" a track from its Nth sample
//! onward: blocked writes are silent no-ops, which is how export tests
//! simulate a mid-stream stall without failure-path plumbing.
//!
//! The muxer itself is moved into the pipeline under test; a cloned
//! [`RecordingHandle`] stays with the test for inspection afterwards.

use parking_lot::Mutex;
use std::sync::Arc;

use splice_common::{SampleTiming, TimeUs, TrackKind};

use crate::error::{MuxError, MuxResult};
use crate::muxer::{MetadataEntry, Muxer, TrackFormat, TrackToken};

/// One recorded sample write (payload bytes are not kept, only facts).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedSample {
    pub pts: TimeUs,
    pub keyframe: bool,
    pub size: usize,
}

#[derive(Debug)]
struct RecordedTrack {
    token: TrackToken,
    format: TrackFormat,
    samples: Vec<RecordedSample>,
    /// Write attempts on this track, including blocked ones.
    attempts: usize,
    /// Attempts at and beyond this index are dropped.
    block_from: Option<usize>,
}

#[derive(Debug, Default)]
struct Inner {
    tracks: Vec<RecordedTrack>,
    metadata: Vec<MetadataEntry>,
    /// Blocks requested before the matching track exists; applied on
    /// `add_track`.
    pending_blocks: Vec<(TrackKind, usize)>,
    next_id: u32,
    closed: bool,
    broken_close: bool,
}

impl Inner {
    fn track_by_kind(&self, kind: TrackKind) -> Option<&RecordedTrack> {
        self.tracks.iter().find(|t| t.token.kind() == kind)
    }
}

/// Muxer double that records writes in memory.
pub struct RecordingMuxer {
    inner: Arc<Mutex<Inner>>,
}

/// Cloneable view into a [`RecordingMuxer`]'s state.
#[derive(Clone)]
pub struct RecordingHandle {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingMuxer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            })),
        }
    }

    pub fn handle(&self) -> RecordingHandle {
        RecordingHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for RecordingMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for RecordingMuxer {
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<TrackToken> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(MuxError::InvalidConfig("cannot add track after close".into()));
        }
        let token = TrackToken::new(inner.next_id, format.kind());
        inner.next_id += 1;

        let block_from = inner
            .pending_blocks
            .iter()
            .position(|(kind, _)| *kind == format.kind())
            .map(|idx| inner.pending_blocks.remove(idx).1);

        inner.tracks.push(RecordedTrack {
            token,
            format: format.clone(),
            samples: Vec::new(),
            attempts: 0,
            block_from,
        });
        Ok(token)
    }

    fn write_sample(
        &mut self,
        token: &TrackToken,
        data: &[u8],
        timing: SampleTiming,
    ) -> MuxResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(MuxError::InvalidConfig("cannot write sample after close".into()));
        }
        let track = inner
            .tracks
            .iter_mut()
            .find(|t| t.token == *token)
            .ok_or_else(|| MuxError::Track(format!("unknown track token {}", token.id())))?;

        let attempt = track.attempts;
        track.attempts += 1;
        if matches!(track.block_from, Some(n) if attempt >= n) {
            tracing::debug!(track = token.id(), attempt, "Dropping blocked sample");
            return Ok(());
        }

        track.samples.push(RecordedSample {
            pts: timing.pts,
            keyframe: timing.flags.keyframe,
            size: data.len(),
        });
        Ok(())
    }

    fn add_metadata(&mut self, entry: MetadataEntry) -> MuxResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(MuxError::InvalidConfig("cannot add metadata after close".into()));
        }
        inner.metadata.push(entry);
        Ok(())
    }

    fn close(&mut self) -> MuxResult<()> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        if inner.broken_close {
            return Err(MuxError::Broken("simulated broken muxer".into()));
        }
        Ok(())
    }
}

impl RecordingHandle {
    /// Drop every write to the first track of `kind` from attempt
    /// `from_sample` onward. May be called before the track exists.
    pub fn block_track_from(&self, kind: TrackKind, from_sample: usize) {
        let mut inner = self.inner.lock();
        if let Some(track) = inner.tracks.iter_mut().find(|t| t.token.kind() == kind) {
            track.block_from = Some(from_sample);
        } else {
            inner.pending_blocks.push((kind, from_sample));
        }
    }

    /// Make `close()` report the muxer as unrecoverably broken.
    pub fn break_on_close(&self) {
        self.inner.lock().broken_close = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn track_count(&self) -> usize {
        self.inner.lock().tracks.len()
    }

    /// Samples actually recorded (blocked writes excluded) for the first
    /// track of `kind`.
    pub fn samples(&self, kind: TrackKind) -> Vec<RecordedSample> {
        self.inner
            .lock()
            .track_by_kind(kind)
            .map(|t| t.samples.clone())
            .unwrap_or_default()
    }

    pub fn sample_count(&self, kind: TrackKind) -> usize {
        self.inner
            .lock()
            .track_by_kind(kind)
            .map(|t| t.samples.len())
            .unwrap_or(0)
    }

    /// Write attempts including blocked ones.
    pub fn attempt_count(&self, kind: TrackKind) -> usize {
        self.inner
            .lock()
            .track_by_kind(kind)
            .map(|t| t.attempts)
            .unwrap_or(0)
    }

    pub fn track_format(&self, kind: TrackKind) -> Option<TrackFormat> {
        self.inner
            .lock()
            .track_by_kind(kind)
            .map(|t| t.format.clone())
    }

    pub fn metadata(&self) -> Vec<MetadataEntry> {
        self.inner.lock().metadata.clone()
    }

    /// Total recorded payload bytes across all tracks.
    pub fn total_bytes(&self) -> u64 {
        self.inner
            .lock()
            .tracks
            .iter()
            .flat_map(|t| t.samples.iter())
            .map(|s| s.size as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::{AudioCodec, Rational, Resolution, SampleFormat, VideoCodec};

    fn video_format() -> TrackFormat {
        TrackFormat::new(SampleFormat::Video {
            codec: VideoCodec::H264,
            resolution: Resolution::HD,
            frame_rate: Rational::FPS_30,
        })
    }

    fn audio_format() -> TrackFormat {
        TrackFormat::new(SampleFormat::Audio {
            codec: AudioCodec::Aac,
            sample_rate: 48_000,
            channels: 2,
        })
    }

    fn write_n(muxer: &mut RecordingMuxer, token: &TrackToken, n: u64) {
        for i in 0..n {
            let pts = Rational::FPS_30.frame_timestamp(i);
            muxer
                .write_sample(token, &[0xAA; 8], SampleTiming::new(pts, i == 0, 8))
                .unwrap();
        }
    }

    #[test]
    fn records_writes_in_order() {
        let mut muxer = RecordingMuxer::new();
        let handle = muxer.handle();
        let vid = muxer.add_track(&video_format()).unwrap();
        write_n(&mut muxer, &vid, 5);

        let samples = handle.samples(TrackKind::Video);
        assert_eq!(samples.len(), 5);
        assert!(samples[0].keyframe);
        assert!(samples.windows(2).all(|p| p[0].pts < p[1].pts));
        assert_eq!(handle.total_bytes(), 40);
    }

    #[test]
    fn blocked_writes_are_silent_noops() {
        let mut muxer = RecordingMuxer::new();
        let handle = muxer.handle();
        // Block requested before the track exists; applied at add_track.
        handle.block_track_from(TrackKind::Video, 3);
        let vid = muxer.add_track(&video_format()).unwrap();
        write_n(&mut muxer, &vid, 10);

        assert_eq!(handle.sample_count(TrackKind::Video), 3);
        assert_eq!(handle.attempt_count(TrackKind::Video), 10);
    }

    #[test]
    fn block_applies_to_existing_track() {
        let mut muxer = RecordingMuxer::new();
        let handle = muxer.handle();
        let vid = muxer.add_track(&video_format()).unwrap();
        write_n(&mut muxer, &vid, 2);
        handle.block_track_from(TrackKind::Video, 2);
        write_n(&mut muxer, &vid, 4);

        // First two landed, everything after the block did not.
        assert_eq!(handle.sample_count(TrackKind::Video), 2);
        assert_eq!(handle.attempt_count(TrackKind::Video), 6);
    }

    #[test]
    fn block_only_affects_named_kind() {
        let mut muxer = RecordingMuxer::new();
        let handle = muxer.handle();
        handle.block_track_from(TrackKind::Video, 0);
        let vid = muxer.add_track(&video_format()).unwrap();
        let aud = muxer.add_track(&audio_format()).unwrap();
        write_n(&mut muxer, &vid, 3);
        write_n(&mut muxer, &aud, 3);

        assert_eq!(handle.sample_count(TrackKind::Video), 0);
        assert_eq!(handle.sample_count(TrackKind::Audio), 3);
    }

    #[test]
    fn metadata_and_close_recorded() {
        let mut muxer = RecordingMuxer::new();
        let handle = muxer.handle();
        muxer.add_metadata(MetadataEntry::Rotation(180)).unwrap();
        muxer
            .add_metadata(MetadataEntry::TrimStart(TimeUs::from_millis(40)))
            .unwrap();
        assert!(!handle.is_closed());
        muxer.close().unwrap();
        assert!(handle.is_closed());
        assert_eq!(
            handle.metadata(),
            vec![
                MetadataEntry::Rotation(180),
                MetadataEntry::TrimStart(TimeUs::from_millis(40)),
            ]
        );
    }

    #[test]
    fn broken_close_surfaces_broken() {
        let mut muxer = RecordingMuxer::new();
        let handle = muxer.handle();
        handle.break_on_close();
        assert!(matches!(muxer.close(), Err(MuxError::Broken(_))));
        // Still considered closed; further writes fail.
        assert!(handle.is_closed());
    }

    #[test]
    fn write_after_close_fails() {
        let mut muxer = RecordingMuxer::new();
        let vid = muxer.add_track(&video_format()).unwrap();
        muxer.close().unwrap();
        let result = muxer.write_sample(&vid, &[1], SampleTiming::new(TimeUs::ZERO, true, 1));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_token_rejected() {
        let mut muxer = RecordingMuxer::new();
        let bogus = TrackToken::new(7, TrackKind::Audio);
        let result = muxer.write_sample(&bogus, &[1], SampleTiming::new(TimeUs::ZERO, true, 1));
        assert!(matches!(result, Err(MuxError::Track(_))));
    }
}
