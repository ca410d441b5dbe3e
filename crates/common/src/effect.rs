//! Effect model: identifiers, instances, and the small capability traits
//! the pipeline drives them through.
//!
//! Effects are plain capability objects (`configure`, `process`,
//! `release`), not an inheritance hierarchy. The engine ships a handful of CPU reference
//! effects so both playback and export can exercise a real chain; GPU shader
//! math is out of scope.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frame::{AudioChunk, VideoFrame};
use crate::types::TimeUs;

/// Unique effect identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(pub String);

impl EffectId {
    /// The designated no-op effect. Applying it changes no pixels but still
    /// forces the track down the decode/encode path on export.
    pub const NOOP: &'static str = "noop";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn noop() -> Self {
        Self::new(Self::NOOP)
    }
}

/// Concrete parameter value for an effect instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
}

impl ParamValue {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// An effect applied to an item or a composition, with parameter values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectInstance {
    pub effect_id: EffectId,
    pub params: Vec<(String, ParamValue)>,
}

impl EffectInstance {
    pub fn new(effect_id: EffectId) -> Self {
        Self {
            effect_id,
            params: Vec::new(),
        }
    }

    pub fn noop() -> Self {
        Self::new(EffectId::noop())
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.push((name.into(), value));
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Capability interface for video frame transforms.
pub trait FrameEffect: Send {
    /// (Re)configure from the instance parameters.
    fn configure(&mut self, instance: &EffectInstance);

    /// Transform one frame in place.
    fn process_frame(&mut self, frame: &mut VideoFrame);

    /// Release any held resources. Called once before drop.
    fn release(&mut self) {}
}

/// Capability interface for audio sample transforms.
///
/// Audio effects may keep position-relative state (envelopes, fades). On a
/// seek, the pipeline resets that state by handing the effect the resolved
/// position offset of the sequence its clip belongs to.
pub trait AudioEffect: Send {
    fn configure(&mut self, instance: &EffectInstance);

    /// Reset relative state to a new sequence-local position.
    fn set_position_offset(&mut self, offset: TimeUs);

    /// Transform one chunk in place.
    fn process_chunk(&mut self, chunk: &mut AudioChunk);

    fn release(&mut self) {}
}

// ---------------------------------------------------------------------------
// Reference CPU effects
// ---------------------------------------------------------------------------

/// Identity transform. Exists so callers can force the transcode path.
#[derive(Default)]
pub struct NoOpEffect;

impl FrameEffect for NoOpEffect {
    fn configure(&mut self, _instance: &EffectInstance) {}
    fn process_frame(&mut self, _frame: &mut VideoFrame) {}
}

/// Additive brightness on RGB channels; `amount` in [-1, 1].
pub struct BrightnessEffect {
    amount: f32,
}

impl BrightnessEffect {
    pub fn new(amount: f32) -> Self {
        Self {
            amount: amount.clamp(-1.0, 1.0),
        }
    }
}

impl FrameEffect for BrightnessEffect {
    fn configure(&mut self, instance: &EffectInstance) {
        if let Some(v) = instance.get_param("amount").and_then(ParamValue::as_float) {
            self.amount = v.clamp(-1.0, 1.0);
        }
    }

    fn process_frame(&mut self, frame: &mut VideoFrame) {
        let delta = (self.amount * 255.0) as i16;
        for px in frame.data.chunks_exact_mut(4) {
            for c in &mut px[0..3] {
                *c = (*c as i16 + delta).clamp(0, 255) as u8;
            }
        }
    }
}

/// Linear gain on audio samples.
pub struct GainEffect {
    gain: f32,
    position_offset: TimeUs,
}

impl GainEffect {
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            position_offset: TimeUs::ZERO,
        }
    }

    /// Current position offset (sequence-local), as set by the last seek.
    pub fn position_offset(&self) -> TimeUs {
        self.position_offset
    }
}

impl AudioEffect for GainEffect {
    fn configure(&mut self, instance: &EffectInstance) {
        if let Some(v) = instance.get_param("gain").and_then(ParamValue::as_float) {
            self.gain = v;
        }
    }

    fn set_position_offset(&mut self, offset: TimeUs) {
        self.position_offset = offset;
    }

    fn process_chunk(&mut self, chunk: &mut AudioChunk) {
        for s in &mut chunk.samples {
            *s *= self.gain;
        }
    }
}

/// Instantiate the frame effect named by an instance.
pub fn build_frame_effect(instance: &EffectInstance) -> Result<Box<dyn FrameEffect>, ConfigError> {
    let mut effect: Box<dyn FrameEffect> = match instance.effect_id.0.as_str() {
        EffectId::NOOP => Box::new(NoOpEffect),
        "brightness" => Box::new(BrightnessEffect::new(0.0)),
        other => {
            return Err(ConfigError::UnknownEffect(other.to_string()));
        }
    };
    effect.configure(instance);
    Ok(effect)
}

/// Instantiate the audio effect named by an instance.
pub fn build_audio_effect(instance: &EffectInstance) -> Result<Box<dyn AudioEffect>, ConfigError> {
    let mut effect: Box<dyn AudioEffect> = match instance.effect_id.0.as_str() {
        "gain" => Box::new(GainEffect::new(1.0)),
        other => {
            return Err(ConfigError::UnknownEffect(other.to_string()));
        }
    };
    effect.configure(instance);
    Ok(effect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resolution;

    #[test]
    fn brightness_clamps_channels() {
        let mut fx = BrightnessEffect::new(1.0);
        let mut frame = VideoFrame::solid(Resolution::new(2, 2), [200, 10, 0, 255], TimeUs::ZERO);
        fx.process_frame(&mut frame);
        assert_eq!(&frame.data[0..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn brightness_configure_from_instance() {
        let instance = EffectInstance::new(EffectId::new("brightness"))
            .with_param("amount", ParamValue::Float(-1.0));
        let mut fx = BrightnessEffect::new(0.0);
        fx.configure(&instance);
        let mut frame = VideoFrame::solid(Resolution::new(1, 1), [100, 100, 100, 255], TimeUs::ZERO);
        fx.process_frame(&mut frame);
        assert_eq!(&frame.data[0..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn noop_leaves_pixels_untouched() {
        let mut fx = NoOpEffect;
        let mut frame = VideoFrame::solid(Resolution::new(1, 1), [9, 8, 7, 255], TimeUs::ZERO);
        fx.process_frame(&mut frame);
        assert_eq!(&frame.data, &[9, 8, 7, 255]);
    }

    #[test]
    fn gain_scales_samples_and_tracks_offset() {
        let mut fx = GainEffect::new(0.5);
        let mut chunk = AudioChunk {
            samples: vec![1.0, -1.0],
            sample_rate: 48_000,
            channels: 2,
            pts: TimeUs::ZERO,
        };
        fx.process_chunk(&mut chunk);
        assert_eq!(chunk.samples, vec![0.5, -0.5]);

        fx.set_position_offset(TimeUs::from_millis(250));
        assert_eq!(fx.position_offset(), TimeUs::from_millis(250));
    }

    #[test]
    fn build_unknown_effect_fails() {
        let instance = EffectInstance::new(EffectId::new("vortex"));
        assert!(build_frame_effect(&instance).is_err());
        assert!(build_audio_effect(&instance).is_err());
    }

    #[test]
    fn build_noop_succeeds() {
        assert!(build_frame_effect(&EffectInstance::noop()).is_ok());
    }
}
