//! The effects/frame pipeline: a bounded in-flight queue with per-item
//! and composition-level effect chains and a last-frame cache.
//!
//! Backpressure is capacity-based. The session polls its source only
//! while `available_capacity() > 0`; a flush discards in-flight frames
//! and thereby revokes any capacity the source had been granted.

use std::collections::VecDeque;

use splice_common::{
    build_audio_effect, build_frame_effect, AudioEffect, ConfigError, EffectInstance,
    FrameEffect, PipelineConfig, VideoFrame,
};

/// Split an instance list into the video and audio chains it names.
/// An instance unknown to both registries is a configuration error.
pub fn build_effect_chains(
    instances: &[EffectInstance],
) -> Result<(Vec<Box<dyn FrameEffect>>, Vec<Box<dyn AudioEffect>>), ConfigError> {
    let mut video = Vec::new();
    let mut audio = Vec::new();
    for instance in instances {
        match build_frame_effect(instance) {
            Ok(fx) => video.push(fx),
            Err(_) => audio.push(build_audio_effect(instance)?),
        }
    }
    Ok((video, audio))
}

pub struct FramePipeline {
    capacity: usize,
    queue: VecDeque<VideoFrame>,
    item_effects: Vec<Box<dyn FrameEffect>>,
    composition_effects: Vec<Box<dyn FrameEffect>>,
    /// Bumped whenever either chain is replaced; identifies which chain
    /// a cached presented frame was rendered with.
    revision: u64,
    last_input: Option<VideoFrame>,
    last_presented: Option<VideoFrame>,
    presented_revision: u64,
}

impl FramePipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            queue: VecDeque::new(),
            item_effects: Vec::new(),
            composition_effects: Vec::new(),
            revision: 0,
            last_input: None,
            last_presented: None,
            presented_revision: 0,
        }
    }

    /// Slots left before the source must suspend.
    pub fn available_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.queue.len())
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Enqueue a frame. Callers must hold a capacity grant.
    pub fn push(&mut self, frame: VideoFrame) {
        debug_assert!(self.available_capacity() > 0, "push without capacity");
        self.queue.push_back(frame);
    }

    /// Replace the per-item chain (on item boundary or seek).
    pub fn set_item_effects(&mut self, chain: Vec<Box<dyn FrameEffect>>) {
        for fx in &mut self.item_effects {
            fx.release();
        }
        self.item_effects = chain;
        self.revision += 1;
    }

    /// Replace the composition-level chain.
    pub fn set_composition_effects(&mut self, chain: Vec<Box<dyn FrameEffect>>) {
        for fx in &mut self.composition_effects {
            fx.release();
        }
        self.composition_effects = chain;
        self.revision += 1;
    }

    /// Dequeue the next frame, run both chains over it, and cache the
    /// result for redraw.
    pub fn present_next(&mut self) -> Option<VideoFrame> {
        let frame = self.queue.pop_front()?;
        self.last_input = Some(frame.clone());
        Some(self.render(frame))
    }

    /// Re-present the most recent output without touching the input
    /// stage. Re-renders from the cached input frame when an effect
    /// chain changed since it was last presented.
    pub fn redraw(&mut self) -> Option<VideoFrame> {
        if self.revision == self.presented_revision {
            return self.last_presented.clone();
        }
        let input = self.last_input.clone()?;
        Some(self.render(input))
    }

    /// Discard all in-flight frames. The last-frame cache survives so a
    /// redraw after a flush still has something to show.
    pub fn flush(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Pipeline flushed");
        }
    }

    fn render(&mut self, mut frame: VideoFrame) -> VideoFrame {
        for fx in &mut self.item_effects {
            fx.process_frame(&mut frame);
        }
        for fx in &mut self.composition_effects {
            fx.process_frame(&mut frame);
        }
        self.last_presented = Some(frame.clone());
        self.presented_revision = self.revision;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::{BrightnessEffect, EffectId, ParamValue, Resolution, TimeUs};

    fn frame(pts_ms: i64) -> VideoFrame {
        VideoFrame::solid(
            Resolution::new(2, 2),
            [100, 100, 100, 255],
            TimeUs::from_millis(pts_ms),
        )
    }

    fn pipeline() -> FramePipeline {
        FramePipeline::new(&PipelineConfig::default())
    }

    #[test]
    fn capacity_decreases_and_recovers() {
        let mut p = pipeline();
        assert_eq!(p.available_capacity(), 4);
        p.push(frame(0));
        p.push(frame(33));
        assert_eq!(p.available_capacity(), 2);
        p.present_next().unwrap();
        assert_eq!(p.available_capacity(), 3);
    }

    #[test]
    fn flush_revokes_outstanding_capacity() {
        let mut p = pipeline();
        p.push(frame(0));
        p.push(frame(33));
        p.flush();
        assert_eq!(p.available_capacity(), 4);
        assert_eq!(p.in_flight(), 0);
    }

    #[test]
    fn effects_apply_in_item_then_composition_order() {
        let mut p = pipeline();
        p.set_item_effects(vec![Box::new(BrightnessEffect::new(0.2))]);
        p.set_composition_effects(vec![Box::new(BrightnessEffect::new(0.2))]);
        p.push(frame(0));
        let out = p.present_next().unwrap();
        // Two +51 steps on a 100 base.
        assert_eq!(out.data[0], 202);
    }

    #[test]
    fn redraw_returns_cached_frame_without_input() {
        let mut p = pipeline();
        p.push(frame(0));
        let out = p.present_next().unwrap();
        assert_eq!(p.in_flight(), 0);
        let redrawn = p.redraw().unwrap();
        assert_eq!(redrawn.pts, out.pts);
        assert_eq!(redrawn.data, out.data);
    }

    #[test]
    fn redraw_rerenders_after_effect_change() {
        let mut p = pipeline();
        p.push(frame(0));
        let plain = p.present_next().unwrap();
        assert_eq!(plain.data[0], 100);

        p.set_item_effects(vec![Box::new(BrightnessEffect::new(0.2))]);
        let redrawn = p.redraw().unwrap();
        assert_eq!(redrawn.data[0], 151);
        // Chain identity now matches; a second redraw is a pure cache hit.
        let again = p.redraw().unwrap();
        assert_eq!(again.data[0], 151);
    }

    #[test]
    fn redraw_survives_flush() {
        let mut p = pipeline();
        p.push(frame(0));
        p.present_next().unwrap();
        p.push(frame(33));
        p.flush();
        assert_eq!(p.redraw().unwrap().pts, TimeUs::ZERO);
    }

    #[test]
    fn chain_split_routes_audio_and_video() {
        let instances = vec![
            EffectInstance::new(EffectId::new("brightness"))
                .with_param("amount", ParamValue::Float(0.1)),
            EffectInstance::new(EffectId::new("gain")).with_param("gain", ParamValue::Float(0.5)),
        ];
        let (video, audio) = build_effect_chains(&instances).unwrap();
        assert_eq!(video.len(), 1);
        assert_eq!(audio.len(), 1);
    }

    #[test]
    fn chain_split_rejects_unknown_effect() {
        let instances = vec![EffectInstance::new(EffectId::new("vortex"))];
        assert!(build_effect_chains(&instances).is_err());
    }
}
