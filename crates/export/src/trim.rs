//! The trim optimizer: decide how much of a trimmed clip can be copied
//! instead of re-encoded.
//!
//! All four outcomes are recorded decisions. A fallback silently selects
//! a correct but slower path; nothing here is an error.

use serde::{Deserialize, Serialize};

use splice_common::{Rational, TimeUs, TrimTolerance};

/// Outcome of planning a trimmed video track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrimOptimization {
    /// Hybrid plan: transcode `[trim_start, cut_keyframe)`, transmux from
    /// `cut_keyframe` on.
    Succeeded { cut_keyframe: TimeUs },

    /// The first keyframe at or after the trim point is so close that
    /// re-coding the leading partial GOP gains nothing. Pure transmux,
    /// cutting at `cut_keyframe`, with container edit metadata absorbing
    /// the difference.
    AbandonedKeyframePlacementOptimalForTrim { cut_keyframe: TimeUs },

    /// No keyframe exists after the trim point (trim near end of
    /// stream). Full transcode.
    AbandonedNoKeyframesAfterStart,

    /// A transformation (rotation/effect) was requested but the device
    /// cannot re-encode the target format. Full transcode attempt.
    FailedFormatMismatch,
}

impl TrimOptimization {
    /// Whether the plan keeps a transmuxed segment.
    pub fn has_transmux_segment(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::AbandonedKeyframePlacementOptimalForTrim { .. }
        )
    }
}

pub struct TrimOptimizer {
    tolerance: TrimTolerance,
}

impl TrimOptimizer {
    pub fn new(tolerance: TrimTolerance) -> Self {
        Self { tolerance }
    }

    /// Plan a trim at `trim_start` against the source's sorted keyframe
    /// timestamps.
    ///
    /// `transform_requested` marks a rotation or effect on the clip;
    /// `can_encode` is the device's answer for the target format.
    pub fn plan(
        &self,
        trim_start: TimeUs,
        keyframes: &[TimeUs],
        frame_rate: Rational,
        transform_requested: bool,
        can_encode: bool,
    ) -> TrimOptimization {
        let Some(cut) = keyframes.iter().copied().find(|k| *k >= trim_start) else {
            tracing::debug!(trim = %trim_start, "No keyframe after trim point");
            return TrimOptimization::AbandonedNoKeyframesAfterStart;
        };

        let window = self.tolerance.window(frame_rate);
        if cut - trim_start <= window {
            tracing::debug!(
                trim = %trim_start,
                cut = %cut,
                window = %window,
                "Keyframe placement already optimal for trim"
            );
            return TrimOptimization::AbandonedKeyframePlacementOptimalForTrim { cut_keyframe: cut };
        }

        if transform_requested && !can_encode {
            tracing::debug!(trim = %trim_start, "Target format not re-encodable");
            return TrimOptimization::FailedFormatMismatch;
        }

        tracing::debug!(trim = %trim_start, cut = %cut, "Hybrid trim plan");
        TrimOptimization::Succeeded { cut_keyframe: cut }
    }
}
