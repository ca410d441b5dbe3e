//! Playback error taxonomy.

use thiserror::Error;

use splice_common::{CodecError, ConfigError, SourceId};

/// Errors surfaced by playback sessions and the controller.
///
/// Codec failures are terminal for the session; once one is observed the
/// state machine accepts only `release()`.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Source {0} has no video track")]
    NoVideoTrack(SourceId),

    #[error("{op} is not valid in state {state}")]
    InvalidState {
        state: &'static str,
        op: &'static str,
    },

    #[error("Pipeline produced no frame at the requested position")]
    PipelineStarved,

    #[error("Failed to start playback thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("Playback thread is not running")]
    Disconnected,
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
