//! The synchronous playback session: seek state machine and frame
//! sequencing over one composition.
//!
//! The session owns all mutable pipeline state. The real-time
//! [`crate::controller::PlayerController`] drives it from a dedicated
//! thread; tests drive it directly, one `step()` per frame.
//!
//! State machine: `Idle → Preparing → Ready → Playing ⇄ Seeking → Ended`,
//! with `Error` reachable from every state. Errors are terminal; only
//! `release()` is accepted afterwards.
//!
//! The session renders the first sequence of the composition through the
//! frame pipeline (by convention the video sequence); the remaining
//! sequences participate in position resolution and audio effect offset
//! resets.

use splice_common::{build_audio_effect, AudioEffect, MediaContext, PipelineConfig, TimeUs, VideoFrame};
use splice_timeline::{resolve, Composition, SequencePosition};

use crate::error::{PlaybackError, PlaybackResult};
use crate::pipeline::{build_effect_chains, FramePipeline};
use crate::source::{open_source, FrameSource};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Preparing,
    Ready,
    Playing,
    Seeking,
    Ended,
    Error,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Seeking => "seeking",
            Self::Ended => "ended",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What one `step()` produced.
#[derive(Debug)]
pub enum StepOutcome {
    Frame(VideoFrame),
    /// The rendered sequence is exhausted. Carries the final presented
    /// timestamp.
    Ended { final_pts: TimeUs },
}

pub struct PlaybackSession {
    composition: Composition,
    ctx: MediaContext,
    state: SessionState,
    pipeline: FramePipeline,
    /// Item cursor within the rendered sequence.
    item_index: usize,
    /// Cumulative start of the current item occurrence on the global
    /// timeline; frame timestamps are rebased by this at ingest.
    item_offset: TimeUs,
    /// Effective end of the rendered sequence (loop truncation point).
    sequence_end: TimeUs,
    source: Option<Box<dyn FrameSource>>,
    /// Composition-level audio processors, instantiated per sequence so
    /// position-offset state is per-sequence.
    audio_effects: Vec<Vec<Box<dyn AudioEffect>>>,
    /// Most recent resolver output, kept for inspection.
    last_positions: Vec<SequencePosition>,
    exhausted: bool,
    last_pts: TimeUs,
}

impl PlaybackSession {
    pub fn new(composition: Composition, ctx: MediaContext, config: PipelineConfig) -> Self {
        let sequence_end = composition.sequence_duration(0);
        Self {
            composition,
            ctx,
            state: SessionState::Idle,
            pipeline: FramePipeline::new(&config),
            item_index: 0,
            item_offset: TimeUs::ZERO,
            sequence_end,
            source: None,
            audio_effects: Vec::new(),
            last_positions: Vec::new(),
            exhausted: false,
            last_pts: TimeUs::ZERO,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Resolver output of the most recent seek (empty before any seek).
    pub fn last_positions(&self) -> &[SequencePosition] {
        &self.last_positions
    }

    /// Load the first item of the rendered sequence and produce the first
    /// frame. Fires at most once per session.
    pub fn prepare(&mut self) -> PlaybackResult<VideoFrame> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("prepare"));
        }
        self.state = SessionState::Preparing;
        match self.prepare_inner() {
            Ok(frame) => {
                self.state = SessionState::Ready;
                tracing::info!(first_pts = %frame.pts, "Session prepared");
                Ok(frame)
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn play(&mut self) -> PlaybackResult<()> {
        match self.state {
            SessionState::Ready | SessionState::Playing => {
                self.state = SessionState::Playing;
                Ok(())
            }
            _ => Err(self.invalid("play")),
        }
    }

    pub fn pause(&mut self) -> PlaybackResult<()> {
        match self.state {
            SessionState::Playing | SessionState::Ready => {
                self.state = SessionState::Ready;
                Ok(())
            }
            _ => Err(self.invalid("pause")),
        }
    }

    /// Advance one frame. Only valid while playing.
    pub fn step(&mut self) -> PlaybackResult<StepOutcome> {
        if self.state != SessionState::Playing {
            return Err(self.invalid("step"));
        }
        match self.step_inner() {
            Ok(outcome) => Ok(outcome),
            Err(err) => self.fail(err),
        }
    }

    /// Reposition to `target`. Re-entrant: a new seek supersedes anything
    /// in flight. Returns the frame at the resolved position.
    pub fn seek_to(&mut self, target: TimeUs) -> PlaybackResult<VideoFrame> {
        let resume = match self.state {
            SessionState::Playing => true,
            SessionState::Ready | SessionState::Seeking | SessionState::Ended => false,
            _ => return Err(self.invalid("seek")),
        };
        self.state = SessionState::Seeking;
        match self.seek_inner(target) {
            Ok(frame) => {
                self.state = if resume {
                    SessionState::Playing
                } else {
                    SessionState::Ready
                };
                tracing::debug!(target = %target, pts = %frame.pts, "Seek completed");
                Ok(frame)
            }
            Err(err) => self.fail(err),
        }
    }

    /// Re-present the last rendered frame without touching the input
    /// stage.
    pub fn redraw(&mut self) -> Option<VideoFrame> {
        self.pipeline.redraw()
    }

    /// Replace the composition-level video chain, e.g. after a paused
    /// effect edit. The next `redraw()` re-renders with the new chain.
    pub fn set_composition_effects(
        &mut self,
        instances: &[splice_common::EffectInstance],
    ) -> PlaybackResult<()> {
        let (video, _) = build_effect_chains(instances)?;
        self.pipeline.set_composition_effects(video);
        Ok(())
    }

    /// Tear the session down. Valid from every state, including `Error`.
    pub fn release(&mut self) {
        self.source = None;
        self.pipeline.flush();
        self.audio_effects.clear();
        self.state = SessionState::Idle;
        tracing::debug!("Session released");
    }

    fn invalid(&self, op: &'static str) -> PlaybackError {
        PlaybackError::InvalidState {
            state: self.state.name(),
            op,
        }
    }

    fn fail<T>(&mut self, err: PlaybackError) -> PlaybackResult<T> {
        tracing::error!(error = %err, "Session entered error state");
        self.state = SessionState::Error;
        Err(err)
    }

    fn prepare_inner(&mut self) -> PlaybackResult<VideoFrame> {
        let (comp_video, _) = build_effect_chains(self.composition.effects())?;
        self.pipeline.set_composition_effects(comp_video);
        self.audio_effects = self
            .composition
            .sequences()
            .iter()
            .map(|_| {
                self.composition
                    .effects()
                    .iter()
                    .filter_map(|inst| build_audio_effect(inst).ok())
                    .collect()
            })
            .collect();
        self.open_item(0)?;
        self.pump()?;
        let frame = self
            .pipeline
            .present_next()
            .ok_or(PlaybackError::PipelineStarved)?;
        self.last_pts = frame.pts;
        Ok(frame)
    }

    fn step_inner(&mut self) -> PlaybackResult<StepOutcome> {
        self.pump()?;
        match self.pipeline.present_next() {
            Some(frame) => {
                self.last_pts = frame.pts;
                Ok(StepOutcome::Frame(frame))
            }
            None => {
                self.state = SessionState::Ended;
                tracing::info!(final_pts = %self.last_pts, "Playback ended");
                Ok(StepOutcome::Ended {
                    final_pts: self.last_pts,
                })
            }
        }
    }

    fn seek_inner(&mut self, target: TimeUs) -> PlaybackResult<VideoFrame> {
        // Flush revokes any capacity the source had been granted.
        self.pipeline.flush();
        self.exhausted = false;

        let positions = resolve(&self.composition, target);

        // Hand every sequence's audio processors their fresh offset.
        for (pos, chain) in positions.iter().zip(self.audio_effects.iter_mut()) {
            for fx in chain.iter_mut() {
                fx.set_position_offset(pos.sequence_offset);
            }
        }

        let primary = positions[0].clone();
        if self.source.is_none() || primary.item_index != self.item_index {
            self.open_item(primary.item_index)?;
        }
        if let Some(source) = self.source.as_mut() {
            source.reposition(primary.local_offset, primary.skip_frames)?;
        }
        self.item_offset = primary.sequence_offset;
        self.last_positions = positions;

        self.pump()?;
        match self.pipeline.present_next() {
            Some(frame) => {
                self.last_pts = frame.pts;
                Ok(frame)
            }
            // Seek into a trailing gap: nothing new to present, hold the
            // cached frame.
            None => self.pipeline.redraw().ok_or(PlaybackError::PipelineStarved),
        }
    }

    fn open_item(&mut self, index: usize) -> PlaybackResult<()> {
        let item = self.composition.sequences()[0].items()[index].clone();
        let (video_fx, _) = build_effect_chains(item.effects())?;
        self.pipeline.set_item_effects(video_fx);
        self.source = Some(open_source(&item, &self.ctx)?);
        self.item_index = index;
        Ok(())
    }

    /// Fill the pipeline while capacity remains, crossing item boundaries
    /// gaplessly.
    fn pump(&mut self) -> PlaybackResult<()> {
        while !self.exhausted && self.pipeline.available_capacity() > 0 {
            let Some(source) = self.source.as_mut() else {
                self.exhausted = true;
                break;
            };
            match source.next_frame()? {
                Some(mut frame) => {
                    frame.pts = frame.pts + self.item_offset;
                    if frame.pts >= self.sequence_end {
                        // Loop truncation point reached.
                        self.exhausted = true;
                        self.source = None;
                    } else {
                        self.pipeline.push(frame);
                    }
                }
                None => self.advance_item()?,
            }
        }
        Ok(())
    }

    fn advance_item(&mut self) -> PlaybackResult<()> {
        let ended = self.composition.sequences()[0].items()[self.item_index].duration();
        self.item_offset = self.item_offset + ended;

        let (count, looping) = {
            let seq = &self.composition.sequences()[0];
            (seq.items().len(), seq.is_looping())
        };
        let next = if self.item_index + 1 < count {
            self.item_index + 1
        } else if looping && self.item_offset < self.sequence_end {
            0
        } else {
            self.exhausted = true;
            self.source = None;
            return Ok(());
        };
        self.open_item(next)?;
        tracing::debug!(item = next, offset = %self.item_offset, "Advanced to next item");
        Ok(())
    }
}
