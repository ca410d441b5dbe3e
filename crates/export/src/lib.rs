//! `splice-export`: batch export pipeline for the Splice composition
//! engine.
//!
//! Decides, per clip and per track, whether samples can be copied into
//! the output container verbatim (transmux) or must go through
//! decode/effects/encode (transcode), with a keyframe-aware trim
//! optimizer for the hybrid case. Exports are cancellable and resumable:
//! a cancelled run leaves a valid partial output plus a
//! [`ResumeManifest`], and a later run splices that output with newly
//! processed remainder.

pub mod controller;
pub mod error;
pub mod plan;
pub mod progress;
pub mod resume;
pub mod trim;

pub use controller::{ExportController, ExportOutcome, ExportResult, ProcessedInput};
pub use error::ExportError;
pub use plan::{muxer_accepts, plan_track, TrackConversion, TrackPlan, TrackQuery};
pub use progress::{ExportProgress, ProgressState, ProgressTracker};
pub use resume::{ItemSummary, ResumeManifest};
pub use trim::{TrimOptimization, TrimOptimizer};
