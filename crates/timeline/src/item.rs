//! Timeline items: the leaf nodes of a sequence.

use serde::{Deserialize, Serialize};

use splice_common::{EffectInstance, Rational, SourceId, TimeUs};

/// One playable unit inside a sequence.
///
/// Items are immutable once constructed. An item may appear by value in
/// multiple sequence slots (e.g. repeated inside a loop) with no shared
/// mutable state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MediaItem {
    /// A trimmed span of a video/audio source.
    Clip {
        source: SourceId,
        /// Start of the trimmed window within the source.
        trim_start: TimeUs,
        /// End of the trimmed window; `None` means "to end of source".
        trim_end: Option<TimeUs>,
        /// Total source duration, probed at construction time.
        source_duration: TimeUs,
        /// Source video frame rate.
        frame_rate: Rational,
        /// Per-item effects.
        effects: Vec<EffectInstance>,
    },
    /// A still image stretched over an assigned duration, emitted as a
    /// synthetic video stream at the given frame rate.
    Image {
        source: SourceId,
        duration: TimeUs,
        frame_rate: Rational,
        effects: Vec<EffectInstance>,
    },
    /// A zero-content placeholder occupying timeline duration.
    Gap { duration: TimeUs },
}

impl MediaItem {
    /// Convenience constructor for an untrimmed clip.
    pub fn clip(source: SourceId, source_duration: TimeUs, frame_rate: Rational) -> Self {
        Self::Clip {
            source,
            trim_start: TimeUs::ZERO,
            trim_end: None,
            source_duration,
            frame_rate,
            effects: Vec::new(),
        }
    }

    /// Convenience constructor for a still image.
    pub fn image(source: SourceId, duration: TimeUs, frame_rate: Rational) -> Self {
        Self::Image {
            source,
            duration,
            frame_rate,
            effects: Vec::new(),
        }
    }

    pub fn gap(duration: TimeUs) -> Self {
        Self::Gap { duration }
    }

    /// Effective end of the trimmed window for clips.
    pub fn effective_trim_end(&self) -> Option<TimeUs> {
        match self {
            Self::Clip {
                trim_end,
                source_duration,
                ..
            } => Some(trim_end.unwrap_or(*source_duration)),
            _ => None,
        }
    }

    /// Duration this item occupies on the timeline.
    pub fn duration(&self) -> TimeUs {
        match self {
            Self::Clip { trim_start, .. } => {
                self.effective_trim_end().expect("clip has trim end") - *trim_start
            }
            Self::Image { duration, .. } | Self::Gap { duration } => *duration,
        }
    }

    /// Frame rate of the item's video content; gaps have none.
    pub fn frame_rate(&self) -> Option<Rational> {
        match self {
            Self::Clip { frame_rate, .. } | Self::Image { frame_rate, .. } => Some(*frame_rate),
            Self::Gap { .. } => None,
        }
    }

    /// Source reference, if the item has one.
    pub fn source(&self) -> Option<&SourceId> {
        match self {
            Self::Clip { source, .. } | Self::Image { source, .. } => Some(source),
            Self::Gap { .. } => None,
        }
    }

    /// Effects attached to this item.
    pub fn effects(&self) -> &[EffectInstance] {
        match self {
            Self::Clip { effects, .. } | Self::Image { effects, .. } => effects,
            Self::Gap { .. } => &[],
        }
    }

    /// Attach effects, builder-style.
    pub fn with_effects(mut self, fx: Vec<EffectInstance>) -> Self {
        match &mut self {
            Self::Clip { effects, .. } | Self::Image { effects, .. } => *effects = fx,
            Self::Gap { .. } => {}
        }
        self
    }

    /// Trim a clip, builder-style. No-op for images and gaps.
    pub fn with_trim(mut self, start: TimeUs, end: Option<TimeUs>) -> Self {
        if let Self::Clip {
            trim_start,
            trim_end,
            ..
        } = &mut self
        {
            *trim_start = start;
            *trim_end = end;
        }
        self
    }

    /// Timestamp of the last presentable frame within this item, relative
    /// to the item's start. Gaps hold their final instant.
    pub fn final_presentable_offset(&self) -> TimeUs {
        let duration = self.duration();
        match self.frame_rate() {
            Some(rate) => {
                let frames = rate.frames_before(duration);
                if frames == 0 {
                    TimeUs::ZERO
                } else {
                    rate.frame_timestamp(frames - 1)
                }
            }
            None => duration.saturating_sub(TimeUs::from_micros(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_duration_with_explicit_trim() {
        let item = MediaItem::clip(
            SourceId::new("a"),
            TimeUs::from_millis(5_000),
            Rational::FPS_30,
        )
        .with_trim(TimeUs::from_millis(500), Some(TimeUs::from_millis(2_500)));
        assert_eq!(item.duration(), TimeUs::from_millis(2_000));
    }

    #[test]
    fn clip_trim_to_end_of_source() {
        let item = MediaItem::clip(
            SourceId::new("a"),
            TimeUs::from_millis(5_000),
            Rational::FPS_30,
        )
        .with_trim(TimeUs::from_millis(1_000), None);
        assert_eq!(item.duration(), TimeUs::from_millis(4_000));
        assert_eq!(item.effective_trim_end(), Some(TimeUs::from_millis(5_000)));
    }

    #[test]
    fn image_and_gap_duration() {
        let img = MediaItem::image(SourceId::new("still"), TimeUs::from_millis(200), Rational::FPS_30);
        assert_eq!(img.duration(), TimeUs::from_millis(200));
        assert_eq!(img.frame_rate(), Some(Rational::FPS_30));

        let gap = MediaItem::gap(TimeUs::from_millis(750));
        assert_eq!(gap.duration(), TimeUs::from_millis(750));
        assert!(gap.frame_rate().is_none());
        assert!(gap.source().is_none());
    }

    #[test]
    fn final_presentable_offset_for_image() {
        // 200ms at 30fps: frames at 0, 33.3, 66.6, 100, 133.3, 166.6 → 6 frames
        let img = MediaItem::image(SourceId::new("still"), TimeUs::from_millis(200), Rational::FPS_30);
        let last = img.final_presentable_offset();
        assert_eq!(last, Rational::FPS_30.frame_timestamp(5));
    }

    #[test]
    fn final_presentable_offset_zero_duration_frames() {
        // Shorter than one frame: only frame 0 fits.
        let img = MediaItem::image(SourceId::new("still"), TimeUs::from_millis(10), Rational::FPS_30);
        assert_eq!(img.final_presentable_offset(), TimeUs::ZERO);
    }
}
