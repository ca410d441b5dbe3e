//! Frame sources: uniform frame producers for the three item kinds.
//!
//! A [`FrameSource`] hides where frames come from (a decoded clip, a
//! synthetic image stream, or nothing at all for gaps) behind one pull
//! interface. Timestamps are item-local; the session rebases them onto
//! the global timeline when it feeds the pipeline.

use std::collections::VecDeque;

use splice_common::{
    MediaContext, MediaSource, Rational, SampleFormat, TimeUs, TrackKind, VideoDecoder, VideoFrame,
};
use splice_timeline::MediaItem;

use crate::error::{PlaybackError, PlaybackResult};

/// A pull-based producer of item-local video frames.
pub trait FrameSource: Send {
    /// Next frame in presentation order, or `None` when the item is
    /// exhausted.
    fn next_frame(&mut self) -> PlaybackResult<Option<VideoFrame>>;

    /// Reposition to an item-local offset. `skip_frames` is the index of
    /// the first frame to emit; frames with a lower index are discarded
    /// without being surfaced.
    fn reposition(&mut self, local_offset: TimeUs, skip_frames: u64) -> PlaybackResult<()>;
}

/// Open the appropriate source for a timeline item.
pub fn open_source(item: &MediaItem, ctx: &MediaContext) -> PlaybackResult<Box<dyn FrameSource>> {
    match item {
        MediaItem::Clip {
            source,
            trim_start,
            frame_rate,
            ..
        } => {
            let media = ctx.sources.open(source)?;
            let format = media
                .track_formats()
                .into_iter()
                .find(|f| matches!(f, SampleFormat::Video { .. }))
                .ok_or_else(|| PlaybackError::NoVideoTrack(source.clone()))?;
            let decoder = ctx.codecs.open_video_decoder(&format)?;
            Ok(Box::new(ClipSource::new(
                media,
                decoder,
                *trim_start,
                item.duration(),
                *frame_rate,
            )?))
        }
        MediaItem::Image {
            source,
            duration,
            frame_rate,
            ..
        } => {
            let bitmap = ctx.images.load(source)?;
            Ok(Box::new(ImageSource::new(bitmap, *frame_rate, *duration)))
        }
        MediaItem::Gap { .. } => Ok(Box::new(GapSource)),
    }
}

/// Decoder-backed source for a trimmed clip.
///
/// Reads encoded samples sequentially, decodes them, and rebases frame
/// timestamps to the trim-in point. Frames outside the trimmed window
/// never leave this struct.
pub struct ClipSource {
    media: Box<dyn MediaSource>,
    decoder: Box<dyn VideoDecoder>,
    trim_start: TimeUs,
    clip_duration: TimeUs,
    frame_rate: Rational,
    pending: VecDeque<VideoFrame>,
    /// Item-local timestamps below this are discarded (seek skip).
    discard_before: TimeUs,
    drained: bool,
}

impl ClipSource {
    pub fn new(
        mut media: Box<dyn MediaSource>,
        decoder: Box<dyn VideoDecoder>,
        trim_start: TimeUs,
        clip_duration: TimeUs,
        frame_rate: Rational,
    ) -> PlaybackResult<Self> {
        media.seek_to_keyframe(TrackKind::Video, trim_start)?;
        Ok(Self {
            media,
            decoder,
            trim_start,
            clip_duration,
            frame_rate,
            pending: VecDeque::new(),
            discard_before: TimeUs::ZERO,
            drained: false,
        })
    }

    fn absorb(&mut self, frames: Vec<VideoFrame>) {
        for mut frame in frames {
            let local = frame.pts - self.trim_start;
            if local.is_negative() || local < self.discard_before {
                continue;
            }
            if local >= self.clip_duration {
                // Frames arrive in presentation order; past the trim-out
                // point nothing further is usable.
                self.drained = true;
                continue;
            }
            frame.pts = local;
            self.pending.push_back(frame);
        }
    }
}

impl FrameSource for ClipSource {
    fn next_frame(&mut self) -> PlaybackResult<Option<VideoFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.drained {
                return Ok(None);
            }
            match self.media.read_sample(TrackKind::Video) {
                Some(sample) => {
                    let frames = self.decoder.decode(&sample)?;
                    self.absorb(frames);
                }
                None => {
                    let frames = self.decoder.flush()?;
                    self.drained = true;
                    self.absorb(frames);
                }
            }
        }
    }

    fn reposition(&mut self, local_offset: TimeUs, skip_frames: u64) -> PlaybackResult<()> {
        self.pending.clear();
        self.drained = false;
        // Decoder-buffered frames belong to the old position.
        self.decoder.flush()?;
        let target = self.trim_start + local_offset;
        let landed = self.media.seek_to_keyframe(TrackKind::Video, target)?;
        self.discard_before = self.frame_rate.frame_timestamp(skip_frames);
        tracing::debug!(
            target = %target,
            landed = %landed,
            skip = skip_frames,
            "Clip source repositioned"
        );
        Ok(())
    }
}

/// Synthetic video source for a still image: the same bitmap emitted at
/// the configured rate for the assigned duration.
pub struct ImageSource {
    bitmap: VideoFrame,
    frame_rate: Rational,
    duration: TimeUs,
    next_index: u64,
}

impl ImageSource {
    pub fn new(bitmap: VideoFrame, frame_rate: Rational, duration: TimeUs) -> Self {
        Self {
            bitmap,
            frame_rate,
            duration,
            next_index: 0,
        }
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> PlaybackResult<Option<VideoFrame>> {
        let pts = self.frame_rate.frame_timestamp(self.next_index);
        if pts >= self.duration {
            return Ok(None);
        }
        self.next_index += 1;
        let mut frame = self.bitmap.clone();
        frame.pts = pts;
        Ok(Some(frame))
    }

    fn reposition(&mut self, _local_offset: TimeUs, skip_frames: u64) -> PlaybackResult<()> {
        self.next_index = skip_frames;
        Ok(())
    }
}

/// Gaps occupy timeline duration but yield no frames; the previous frame
/// stays on screen for their span.
pub struct GapSource;

impl FrameSource for GapSource {
    fn next_frame(&mut self) -> PlaybackResult<Option<VideoFrame>> {
        Ok(None)
    }

    fn reposition(&mut self, _local_offset: TimeUs, _skip_frames: u64) -> PlaybackResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::testing::{fake_context, FakeProvider, FakeSourceSpec};
    use splice_common::{Resolution, SourceId};

    fn clip_context(frames: u64, gop: u64) -> MediaContext {
        fake_context(
            FakeProvider::new()
                .with_source("clip", FakeSourceSpec::video(frames, Rational::FPS_30, gop)),
        )
    }

    fn open_clip(ctx: &MediaContext, item: &MediaItem) -> Box<dyn FrameSource> {
        open_source(item, ctx).unwrap()
    }

    #[test]
    fn clip_source_enumerates_all_frames() {
        let ctx = clip_context(5, 10);
        let item = MediaItem::clip(
            SourceId::new("clip"),
            Rational::FPS_30.frame_timestamp(5),
            Rational::FPS_30,
        );
        let mut src = open_clip(&ctx, &item);
        for i in 0..5 {
            let frame = src.next_frame().unwrap().unwrap();
            assert_eq!(frame.pts, Rational::FPS_30.frame_timestamp(i));
        }
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn clip_source_rebases_to_trim_in() {
        // Trim in at frame 10 (keyframe), out at frame 20.
        let ctx = clip_context(30, 10);
        let item = MediaItem::clip(
            SourceId::new("clip"),
            Rational::FPS_30.frame_timestamp(30),
            Rational::FPS_30,
        )
        .with_trim(
            Rational::FPS_30.frame_timestamp(10),
            Some(Rational::FPS_30.frame_timestamp(20)),
        );
        let mut src = open_clip(&ctx, &item);
        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(first.pts, TimeUs::ZERO);
        // Red channel carries the source frame index.
        assert_eq!(first.data[0], 10);
        let mut count = 1;
        while src.next_frame().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 10);
    }

    #[test]
    fn clip_reposition_skips_pre_keyframe_frames() {
        let ctx = clip_context(30, 10);
        let item = MediaItem::clip(
            SourceId::new("clip"),
            Rational::FPS_30.frame_timestamp(30),
            Rational::FPS_30,
        );
        let mut src = open_clip(&ctx, &item);
        // Land mid-GOP: frame 15. The source seeks back to keyframe 10 and
        // must silently discard frames 10..14.
        let local = Rational::FPS_30.frame_timestamp(15);
        src.reposition(local, 15).unwrap();
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.pts, local);
        assert_eq!(frame.data[0], 15);
    }

    #[test]
    fn image_source_frame_count_and_timestamps() {
        // 200ms at 30fps: frames 0..=5.
        let bitmap = VideoFrame::solid(Resolution::new(2, 2), [9, 9, 9, 255], TimeUs::ZERO);
        let mut src = ImageSource::new(bitmap, Rational::FPS_30, TimeUs::from_millis(200));
        let mut timestamps = Vec::new();
        while let Some(frame) = src.next_frame().unwrap() {
            timestamps.push(frame.pts);
        }
        assert_eq!(timestamps.len(), 6);
        assert_eq!(timestamps[3], TimeUs::from_millis(100));
    }

    #[test]
    fn image_reposition_jumps_to_frame_index() {
        let bitmap = VideoFrame::solid(Resolution::new(2, 2), [9, 9, 9, 255], TimeUs::ZERO);
        let mut src = ImageSource::new(bitmap, Rational::FPS_30, TimeUs::from_millis(200));
        src.reposition(TimeUs::from_millis(100), 3).unwrap();
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.pts, Rational::FPS_30.frame_timestamp(3));
    }

    #[test]
    fn gap_source_yields_nothing() {
        let mut src = GapSource;
        assert!(src.next_frame().unwrap().is_none());
        src.reposition(TimeUs::from_millis(50), 0).unwrap();
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_video_track_is_rejected() {
        let ctx = clip_context(5, 10);
        let item = MediaItem::clip(
            SourceId::new("absent"),
            TimeUs::from_millis(100),
            Rational::FPS_30,
        );
        assert!(matches!(
            open_source(&item, &ctx),
            Err(PlaybackError::Config(_))
        ));
    }
}
