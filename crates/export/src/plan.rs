//! Per-clip, per-track conversion planning: transmux, transcode, or the
//! hybrid of both.

use serde::{Deserialize, Serialize};

use splice_common::{AudioCodec, SampleFormat, TimeUs, TrackKind, VideoCodec};

use crate::trim::{TrimOptimization, TrimOptimizer};

/// How a track's samples travel from source to output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackConversion {
    /// Copy samples verbatim, adjusting only container metadata.
    Transmux,
    /// Decode, apply effects, re-encode.
    Transcode,
    /// Transcode the leading partial GOP, transmux the remainder.
    TransmuxedAndTranscoded,
}

/// Planning inputs for one clip track.
pub struct TrackQuery<'a> {
    pub format: &'a SampleFormat,
    /// Trim-in point within the source; `None` for untrimmed clips.
    pub trim_start: Option<TimeUs>,
    /// Sorted keyframe timestamps (video only).
    pub keyframes: &'a [TimeUs],
    pub has_effects: bool,
    /// Container-level rotation requested for the export.
    pub rotation_degrees: u32,
    /// Whether the device can re-encode this format.
    pub can_encode: bool,
}

/// The decision for one clip track.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackPlan {
    pub kind: TrackKind,
    pub conversion: TrackConversion,
    pub optimization: Option<TrimOptimization>,
    /// For hybrid plans: transcode source timestamps below this, transmux
    /// from it on.
    pub transcode_until: Option<TimeUs>,
}

/// Formats the MP4 muxer takes verbatim.
pub fn muxer_accepts(format: &SampleFormat) -> bool {
    match format {
        SampleFormat::Video { codec, .. } => {
            matches!(codec, VideoCodec::H264 | VideoCodec::H265)
        }
        SampleFormat::Audio { codec, .. } => {
            matches!(codec, AudioCodec::Aac | AudioCodec::Opus)
        }
    }
}

/// Decide the conversion for one clip track.
///
/// Transmux requires: no effects on the track, a muxer-acceptable sample
/// format, and (for trimmed video) the optimizer's approval. The
/// designated no-op effect counts as an effect and forces transcode.
pub fn plan_track(query: &TrackQuery<'_>, optimizer: &TrimOptimizer) -> TrackPlan {
    let kind = query.format.kind();

    if !muxer_accepts(query.format) {
        return TrackPlan {
            kind,
            conversion: TrackConversion::Transcode,
            optimization: None,
            transcode_until: None,
        };
    }

    if query.has_effects {
        return TrackPlan {
            kind,
            conversion: TrackConversion::Transcode,
            optimization: None,
            transcode_until: None,
        };
    }

    match kind {
        TrackKind::Audio => TrackPlan {
            kind,
            conversion: TrackConversion::Transmux,
            optimization: None,
            transcode_until: None,
        },
        TrackKind::Video => plan_video(query, optimizer),
    }
}

fn plan_video(query: &TrackQuery<'_>, optimizer: &TrimOptimizer) -> TrackPlan {
    let Some(trim_start) = query.trim_start else {
        return TrackPlan {
            kind: TrackKind::Video,
            conversion: TrackConversion::Transmux,
            optimization: None,
            transcode_until: None,
        };
    };

    let frame_rate = query
        .format
        .frame_rate()
        .unwrap_or(splice_common::Rational::FPS_30);
    let optimization = optimizer.plan(
        trim_start,
        query.keyframes,
        frame_rate,
        query.rotation_degrees != 0,
        query.can_encode,
    );

    let (conversion, transcode_until) = match &optimization {
        TrimOptimization::Succeeded { cut_keyframe } => (
            TrackConversion::TransmuxedAndTranscoded,
            Some(*cut_keyframe),
        ),
        TrimOptimization::AbandonedKeyframePlacementOptimalForTrim { .. } => {
            (TrackConversion::Transmux, None)
        }
        TrimOptimization::AbandonedNoKeyframesAfterStart
        | TrimOptimization::FailedFormatMismatch => (TrackConversion::Transcode, None),
    };

    tracing::debug!(conversion = ?conversion, "Video track planned");
    TrackPlan {
        kind: TrackKind::Video,
        conversion,
        optimization: Some(optimization),
        transcode_until,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::{Rational, Resolution, TrimTolerance};

    const FPS: Rational = Rational::FPS_30;

    fn video_format(codec: VideoCodec) -> SampleFormat {
        SampleFormat::Video {
            codec,
            resolution: Resolution::HD,
            frame_rate: FPS,
        }
    }

    fn audio_format(codec: AudioCodec) -> SampleFormat {
        SampleFormat::Audio {
            codec,
            sample_rate: 48_000,
            channels: 2,
        }
    }

    fn optimizer() -> TrimOptimizer {
        TrimOptimizer::new(TrimTolerance::default())
    }

    fn keyframes() -> Vec<TimeUs> {
        (0..10).map(|s| TimeUs::from_millis(s * 1_000)).collect()
    }

    fn query(format: &SampleFormat) -> TrackQuery<'_> {
        TrackQuery {
            format,
            trim_start: None,
            keyframes: &[],
            has_effects: false,
            rotation_degrees: 0,
            can_encode: true,
        }
    }

    #[test]
    fn untrimmed_clean_video_transmuxes() {
        let format = video_format(VideoCodec::H264);
        let plan = plan_track(&query(&format), &optimizer());
        assert_eq!(plan.conversion, TrackConversion::Transmux);
        assert!(plan.optimization.is_none());
    }

    #[test]
    fn effects_force_transcode() {
        let format = video_format(VideoCodec::H264);
        let mut q = query(&format);
        q.has_effects = true;
        let plan = plan_track(&q, &optimizer());
        assert_eq!(plan.conversion, TrackConversion::Transcode);
    }

    #[test]
    fn unacceptable_format_forces_transcode() {
        let format = video_format(VideoCodec::Vp9);
        let plan = plan_track(&query(&format), &optimizer());
        assert_eq!(plan.conversion, TrackConversion::Transcode);

        let format = audio_format(AudioCodec::Mp3);
        let plan = plan_track(&query(&format), &optimizer());
        assert_eq!(plan.conversion, TrackConversion::Transcode);
    }

    #[test]
    fn mid_gop_trim_yields_hybrid() {
        let format = video_format(VideoCodec::H264);
        let keys = keyframes();
        let mut q = query(&format);
        q.trim_start = Some(TimeUs::from_millis(500));
        q.keyframes = &keys;
        let plan = plan_track(&q, &optimizer());
        assert_eq!(plan.conversion, TrackConversion::TransmuxedAndTranscoded);
        assert_eq!(plan.transcode_until, Some(TimeUs::from_millis(1_000)));
    }

    #[test]
    fn near_keyframe_trim_stays_pure_transmux() {
        let format = video_format(VideoCodec::H264);
        let keys = keyframes();
        let mut q = query(&format);
        q.trim_start = Some(TimeUs::from_millis(990));
        q.keyframes = &keys;
        let plan = plan_track(&q, &optimizer());
        assert_eq!(plan.conversion, TrackConversion::Transmux);
        assert!(matches!(
            plan.optimization,
            Some(TrimOptimization::AbandonedKeyframePlacementOptimalForTrim { .. })
        ));
    }

    #[test]
    fn rotation_without_encoder_support_transcodes() {
        let format = video_format(VideoCodec::H264);
        let keys = keyframes();
        let mut q = query(&format);
        q.trim_start = Some(TimeUs::from_millis(500));
        q.keyframes = &keys;
        q.rotation_degrees = 90;
        q.can_encode = false;
        let plan = plan_track(&q, &optimizer());
        assert_eq!(plan.conversion, TrackConversion::Transcode);
        assert_eq!(
            plan.optimization,
            Some(TrimOptimization::FailedFormatMismatch)
        );
    }

    #[test]
    fn clean_audio_transmuxes() {
        let format = audio_format(AudioCodec::Aac);
        let plan = plan_track(&query(&format), &optimizer());
        assert_eq!(plan.kind, TrackKind::Audio);
        assert_eq!(plan.conversion, TrackConversion::Transmux);
    }
}
