//! `splice-playback`: real-time playback for Splice compositions.
//!
//! Layers, bottom up:
//!
//! - [`source`]: uniform [`source::FrameSource`] producers for clips,
//!   images, and gaps.
//! - [`pipeline`]: the bounded effects/frame pipeline with backpressure,
//!   last-frame cache, and redraw.
//! - [`session`]: the synchronous seek state machine
//!   (`Idle → Preparing → Ready → Playing ⇄ Seeking → Ended`).
//! - [`controller`]: the real-time driver thread with command/event
//!   channels.

pub mod controller;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod source;

pub use controller::{PlayerCommand, PlayerController, PlayerEvent};
pub use error::{PlaybackError, PlaybackResult};
pub use pipeline::FramePipeline;
pub use session::{PlaybackSession, SessionState, StepOutcome};
pub use source::{open_source, ClipSource, FrameSource, GapSource, ImageSource};
