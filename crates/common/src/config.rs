//! Tunable configuration for playback and export sessions.

use serde::{Deserialize, Serialize};

use crate::types::{Rational, TimeUs};

/// Keyframe-proximity tolerance for the trim optimizer, expressed in
/// frame durations rather than absolute time.
///
/// The window is empirical: when the first keyframe after a trim point is
/// within this many frame durations, re-coding the leading partial GOP
/// gains nothing and the optimization is abandoned. Callers calibrate it
/// against their target codecs instead of relying on a fixed millisecond
/// value.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrimTolerance {
    /// Window size as a multiple of the average frame duration.
    pub frame_durations: f64,
}

impl Default for TrimTolerance {
    fn default() -> Self {
        Self {
            frame_durations: 3.0,
        }
    }
}

impl TrimTolerance {
    pub fn new(frame_durations: f64) -> Self {
        assert!(frame_durations >= 0.0, "tolerance must be non-negative");
        Self { frame_durations }
    }

    /// Absolute window for a stream at the given frame rate.
    pub fn window(&self, frame_rate: Rational) -> TimeUs {
        let frame_us = frame_rate.frame_duration().as_micros() as f64;
        TimeUs((frame_us * self.frame_durations).round() as i64)
    }
}

/// Playback pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum decoded frames in flight between source and effects stage.
    /// The source is suspended once this capacity is exhausted.
    pub capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { capacity: 4 }
    }
}

/// Export session options.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Trim optimizer tolerance.
    pub trim_tolerance: TrimTolerance,
    /// Container-level rotation to apply (degrees clockwise, multiple of 90).
    pub rotation_degrees: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_window_scales_with_frame_rate() {
        let tol = TrimTolerance::default();
        // 3 frames at 30fps ~= 100ms
        let w30 = tol.window(Rational::FPS_30);
        assert!((w30.as_millis_f64() - 100.0).abs() < 1.0);
        // 3 frames at 60fps ~= 50ms
        let w60 = tol.window(Rational::FPS_60);
        assert!((w60.as_millis_f64() - 50.0).abs() < 1.0);
    }

    #[test]
    fn zero_tolerance_window() {
        let tol = TrimTolerance::new(0.0);
        assert_eq!(tol.window(Rational::FPS_30), TimeUs::ZERO);
    }

    #[test]
    fn pipeline_config_default_capacity() {
        assert_eq!(PipelineConfig::default().capacity, 4);
    }
}
