//! Real-time playback driver.
//!
//! The controller owns a dedicated playback thread; all pipeline state
//! lives in the [`PlaybackSession`] on that thread and is reached only
//! through the command channel. Lifecycle events flow back over an
//! unbounded event channel.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use splice_common::{MediaContext, PipelineConfig, TimeUs, VideoFrame};
use splice_timeline::Composition;

use crate::error::{PlaybackError, PlaybackResult};
use crate::session::{PlaybackSession, SessionState, StepOutcome};

/// Commands accepted by the playback thread.
#[derive(Debug)]
pub enum PlayerCommand {
    Play,
    Pause,
    SeekTo(TimeUs),
    Redraw,
    Release,
}

/// Lifecycle and frame events emitted by the playback thread.
#[derive(Debug)]
pub enum PlayerEvent {
    Ready,
    FirstFrameRendered,
    Frame(VideoFrame),
    Ended { final_pts: TimeUs },
    Error(String),
}

pub struct PlayerController {
    cmd_tx: Option<Sender<PlayerCommand>>,
    event_rx: Receiver<PlayerEvent>,
    thread: Option<JoinHandle<()>>,
}

impl PlayerController {
    /// Spawn the playback thread and begin preparation. `Ready` and
    /// `FirstFrameRendered` arrive on the event channel once the first
    /// frame is available.
    pub fn start(
        composition: Composition,
        ctx: MediaContext,
        config: PipelineConfig,
    ) -> PlaybackResult<Self> {
        let (cmd_tx, cmd_rx) = channel::unbounded::<PlayerCommand>();
        let (event_tx, event_rx) = channel::unbounded::<PlayerEvent>();
        let session = PlaybackSession::new(composition, ctx, config);
        let thread = thread::Builder::new()
            .name("playback-worker".to_string())
            .spawn(move || playback_thread_main(session, cmd_rx, event_tx))
            .map_err(PlaybackError::ThreadSpawn)?;
        Ok(Self {
            cmd_tx: Some(cmd_tx),
            event_rx,
            thread: Some(thread),
        })
    }

    pub fn play(&self) -> PlaybackResult<()> {
        self.send(PlayerCommand::Play)
    }

    pub fn pause(&self) -> PlaybackResult<()> {
        self.send(PlayerCommand::Pause)
    }

    pub fn seek_to(&self, target: TimeUs) -> PlaybackResult<()> {
        self.send(PlayerCommand::SeekTo(target))
    }

    /// Re-present the last frame (paused redraw after an effect change).
    pub fn redraw(&self) -> PlaybackResult<()> {
        self.send(PlayerCommand::Redraw)
    }

    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.event_rx
    }

    /// Stop the playback thread and wait for it to finish. Synchronous:
    /// when this returns, the session is torn down. Idempotent.
    pub fn release(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(PlayerCommand::Release);
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::warn!("Playback thread panicked during release");
            }
        }
    }

    fn send(&self, cmd: PlayerCommand) -> PlaybackResult<()> {
        match &self.cmd_tx {
            Some(tx) => tx.send(cmd).map_err(|_| PlaybackError::Disconnected),
            None => Err(PlaybackError::Disconnected),
        }
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        self.release();
    }
}

/// Main loop of the playback thread. Paces frame delivery to the
/// presentation timestamps and drains commands between frames.
fn playback_thread_main(
    mut session: PlaybackSession,
    cmd_rx: Receiver<PlayerCommand>,
    event_tx: Sender<PlayerEvent>,
) {
    tracing::info!("Playback thread started");

    let first = match session.prepare() {
        Ok(frame) => frame,
        Err(err) => {
            let _ = event_tx.send(PlayerEvent::Error(err.to_string()));
            return;
        }
    };
    let _ = event_tx.send(PlayerEvent::Ready);
    let _ = event_tx.send(PlayerEvent::FirstFrameRendered);
    let mut last_pts = first.pts;
    let _ = event_tx.send(PlayerEvent::Frame(first));

    let mut playing = false;

    loop {
        match cmd_rx.try_recv() {
            Ok(PlayerCommand::Play) => match session.play() {
                Ok(()) => playing = true,
                Err(err) => {
                    let _ = event_tx.send(PlayerEvent::Error(err.to_string()));
                }
            },
            Ok(PlayerCommand::Pause) => {
                if session.pause().is_ok() {
                    playing = false;
                }
            }
            Ok(PlayerCommand::SeekTo(target)) => match session.seek_to(target) {
                Ok(frame) => {
                    playing = session.state() == SessionState::Playing;
                    last_pts = frame.pts;
                    let _ = event_tx.send(PlayerEvent::Frame(frame));
                }
                Err(err) => {
                    playing = false;
                    let _ = event_tx.send(PlayerEvent::Error(err.to_string()));
                }
            },
            Ok(PlayerCommand::Redraw) => {
                if let Some(frame) = session.redraw() {
                    let _ = event_tx.send(PlayerEvent::Frame(frame));
                }
            }
            Ok(PlayerCommand::Release) => {
                session.release();
                tracing::info!("Playback thread released");
                return;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                session.release();
                tracing::info!("Command channel closed, playback thread exiting");
                return;
            }
        }

        if !playing {
            // Keep checking for commands without busy-waiting.
            thread::sleep(Duration::from_millis(5));
            continue;
        }

        match session.step() {
            Ok(StepOutcome::Frame(frame)) => {
                let delta = frame.pts.saturating_sub(last_pts);
                last_pts = frame.pts;
                let _ = event_tx.send(PlayerEvent::Frame(frame));
                // Pace to the presentation timeline, capped so a gap or a
                // seek never stalls command handling for long.
                let sleep_us = delta.as_micros().clamp(0, 100_000) as u64;
                thread::sleep(Duration::from_micros(sleep_us));
            }
            Ok(StepOutcome::Ended { final_pts }) => {
                playing = false;
                let _ = event_tx.send(PlayerEvent::Ended { final_pts });
            }
            Err(err) => {
                playing = false;
                let _ = event_tx.send(PlayerEvent::Error(err.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::testing::{fake_context, FakeProvider, FakeSourceSpec};
    use splice_common::{Rational, SourceId};
    use splice_timeline::{MediaItem, Sequence};

    const FPS: Rational = Rational::FPS_30;
    const WAIT: Duration = Duration::from_secs(5);

    fn controller_for(frames: u64) -> PlayerController {
        let provider = FakeProvider::new()
            .with_source("a", FakeSourceSpec::video(frames, FPS, 10));
        let item = MediaItem::clip(SourceId::new("a"), FPS.frame_timestamp(frames), FPS);
        let composition = Composition::new(vec![Sequence::new(vec![item])], vec![]).unwrap();
        PlayerController::start(composition, fake_context(provider), PipelineConfig::default())
            .unwrap()
    }

    fn expect_ready(ctl: &PlayerController) {
        assert!(matches!(
            ctl.events().recv_timeout(WAIT).unwrap(),
            PlayerEvent::Ready
        ));
        assert!(matches!(
            ctl.events().recv_timeout(WAIT).unwrap(),
            PlayerEvent::FirstFrameRendered
        ));
    }

    #[test]
    fn start_reports_ready_then_first_frame() {
        let mut ctl = controller_for(4);
        expect_ready(&ctl);
        match ctl.events().recv_timeout(WAIT).unwrap() {
            PlayerEvent::Frame(frame) => assert_eq!(frame.pts, TimeUs::ZERO),
            other => panic!("expected first frame, got {other:?}"),
        }
        ctl.release();
    }

    #[test]
    fn play_runs_to_ended() {
        let mut ctl = controller_for(4);
        expect_ready(&ctl);
        ctl.play().unwrap();

        let mut frames = Vec::new();
        let final_pts = loop {
            match ctl.events().recv_timeout(WAIT).unwrap() {
                PlayerEvent::Frame(frame) => frames.push(frame.pts),
                PlayerEvent::Ended { final_pts } => break final_pts,
                other => panic!("unexpected event {other:?}"),
            }
        };
        assert_eq!(frames.len(), 4);
        assert_eq!(final_pts, FPS.frame_timestamp(3));
        ctl.release();
    }

    #[test]
    fn seek_emits_frame_at_target() {
        let mut ctl = controller_for(30);
        expect_ready(&ctl);
        // Drain the initial frame.
        ctl.events().recv_timeout(WAIT).unwrap();

        ctl.seek_to(FPS.frame_timestamp(20)).unwrap();
        match ctl.events().recv_timeout(WAIT).unwrap() {
            PlayerEvent::Frame(frame) => assert_eq!(frame.pts, FPS.frame_timestamp(20)),
            other => panic!("expected seek frame, got {other:?}"),
        }
        ctl.release();
    }

    #[test]
    fn error_surfaces_as_event() {
        let provider = FakeProvider::new()
            .with_source("a", FakeSourceSpec::video(6, FPS, 10));
        let items = vec![
            MediaItem::clip(SourceId::new("a"), FPS.frame_timestamp(6), FPS),
            MediaItem::clip(SourceId::new("ghost"), FPS.frame_timestamp(6), FPS),
        ];
        let composition = Composition::new(vec![Sequence::new(items)], vec![]).unwrap();
        let mut ctl = PlayerController::start(
            composition,
            fake_context(provider),
            PipelineConfig::default(),
        )
        .unwrap();
        expect_ready(&ctl);
        ctl.play().unwrap();

        let saw_error = loop {
            match ctl.events().recv_timeout(WAIT) {
                Ok(PlayerEvent::Error(_)) => break true,
                Ok(_) => {}
                Err(_) => break false,
            }
        };
        assert!(saw_error);
        ctl.release();
    }

    #[test]
    fn release_is_synchronous_and_idempotent() {
        let mut ctl = controller_for(4);
        expect_ready(&ctl);
        ctl.release();
        assert!(ctl.thread.is_none());
        // Commands after release fail cleanly.
        assert!(matches!(ctl.play(), Err(PlaybackError::Disconnected)));
        ctl.release();
    }
}
