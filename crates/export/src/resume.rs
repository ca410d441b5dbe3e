//! Resume manifests: the in-memory record that makes a cancelled
//! export's partial output usable as the starting point of a later run.
//!
//! The manifest travels alongside the partial output file (callers
//! typically serialize it next to the file). On resume it is validated
//! against the composition being exported: resuming a foreign or edited
//! composition is a configuration error, not a codec error.

use serde::{Deserialize, Serialize};

use splice_common::{ConfigError, SampleFormat, TimeUs};
use splice_timeline::{Composition, MediaItem};

/// One timeline item, reduced to the facts that identify it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    /// Source reference; `None` for gaps.
    pub source: Option<String>,
    pub duration_us: i64,
}

impl ItemSummary {
    fn of(item: &MediaItem) -> Self {
        Self {
            source: item.source().map(|s| s.0.clone()),
            duration_us: item.duration().as_micros(),
        }
    }
}

/// Checkpoint of a cancelled export.
///
/// Only the video track is checkpointed at sample granularity; audio is
/// cheap enough to reprocess in full on resume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResumeManifest {
    /// Primary-sequence items of the composition this manifest belongs to.
    pub timeline: Vec<ItemSummary>,
    /// Nominal composition duration.
    pub duration_us: i64,
    /// Output video track format of the partial file.
    pub video_format: SampleFormat,
    /// Video samples durably written before cancellation.
    pub video_samples_written: u64,
    /// Output-timeline timestamp of the last durable video sample.
    pub last_video_pts: TimeUs,
}

impl ResumeManifest {
    pub fn capture(
        composition: &Composition,
        video_format: SampleFormat,
        video_samples_written: u64,
        last_video_pts: TimeUs,
    ) -> Self {
        Self {
            timeline: composition.sequences()[0]
                .items()
                .iter()
                .map(ItemSummary::of)
                .collect(),
            duration_us: composition.duration().as_micros(),
            video_format,
            video_samples_written,
            last_video_pts,
        }
    }

    /// Check that this manifest was captured from `composition`.
    pub fn validate(&self, composition: &Composition) -> Result<(), ConfigError> {
        if self.duration_us != composition.duration().as_micros() {
            return Err(ConfigError::ResumeMismatch(format!(
                "duration {}us does not match composition {}",
                self.duration_us,
                composition.duration()
            )));
        }
        let items = composition.sequences()[0].items();
        if self.timeline.len() != items.len() {
            return Err(ConfigError::ResumeMismatch(format!(
                "manifest has {} items, composition has {}",
                self.timeline.len(),
                items.len()
            )));
        }
        for (idx, (summary, item)) in self.timeline.iter().zip(items).enumerate() {
            if *summary != ItemSummary::of(item) {
                return Err(ConfigError::ResumeMismatch(format!(
                    "item {idx} differs from the exported composition"
                )));
            }
        }
        Ok(())
    }

    /// Output-timeline position at which new video processing starts: the
    /// first frame boundary after the last durable sample.
    pub fn next_video_start(&self) -> TimeUs {
        match self.video_format.frame_rate() {
            Some(rate) => {
                let next = rate.frames_before(self.last_video_pts + TimeUs::from_micros(1));
                rate.frame_timestamp(next)
            }
            None => self.last_video_pts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::{Rational, Resolution, SourceId, VideoCodec};
    use splice_timeline::Sequence;

    fn composition() -> Composition {
        Composition::new(
            vec![Sequence::new(vec![
                MediaItem::clip(
                    SourceId::new("a"),
                    TimeUs::from_millis(2_000),
                    Rational::FPS_30,
                ),
                MediaItem::gap(TimeUs::from_millis(500)),
            ])],
            vec![],
        )
        .unwrap()
    }

    fn video_format() -> SampleFormat {
        SampleFormat::Video {
            codec: VideoCodec::H264,
            resolution: Resolution::new(64, 36),
            frame_rate: Rational::FPS_30,
        }
    }

    #[test]
    fn capture_then_validate_roundtrip() {
        let comp = composition();
        let manifest =
            ResumeManifest::capture(&comp, video_format(), 12, Rational::FPS_30.frame_timestamp(11));
        assert!(manifest.validate(&comp).is_ok());

        let json = serde_json::to_string(&manifest).unwrap();
        let back: ResumeManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
        assert!(back.validate(&comp).is_ok());
    }

    #[test]
    fn foreign_composition_rejected() {
        let comp = composition();
        let manifest =
            ResumeManifest::capture(&comp, video_format(), 5, Rational::FPS_30.frame_timestamp(4));

        let other = Composition::new(
            vec![Sequence::new(vec![MediaItem::clip(
                SourceId::new("b"),
                TimeUs::from_millis(2_000),
                Rational::FPS_30,
            )])],
            vec![],
        )
        .unwrap();
        assert!(matches!(
            manifest.validate(&other),
            Err(ConfigError::ResumeMismatch(_))
        ));
    }

    #[test]
    fn next_start_is_frame_after_last_sample() {
        let comp = composition();
        let manifest =
            ResumeManifest::capture(&comp, video_format(), 12, Rational::FPS_30.frame_timestamp(11));
        assert_eq!(
            manifest.next_video_start(),
            Rational::FPS_30.frame_timestamp(12)
        );
    }
}
