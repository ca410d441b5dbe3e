//! Central error taxonomy (thiserror-based).
//!
//! Configuration problems fail fast at construction and never reach the
//! pipeline. Codec failures are fatal to the session that hit them. Trim
//! optimization fallbacks are recorded decisions, not errors, and live in
//! the export crate.

use thiserror::Error;

use crate::types::TrackKind;

/// Whether a codec error came from the decode or encode side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CodecRole {
    Decoder,
    Encoder,
}

impl std::fmt::Display for CodecRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decoder => write!(f, "decoder"),
            Self::Encoder => write!(f, "encoder"),
        }
    }
}

/// Invalid configuration, caught at construction time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Composition must contain at least one sequence")]
    EmptyComposition,

    #[error("Composition has {0} looping sequences; at most one is allowed")]
    MultipleLoopingSequences(usize),

    #[error("Composition needs at least one non-looping sequence to bound its duration")]
    NoNonLoopingSequence,

    #[error("Sequence {0} is empty")]
    EmptySequence(usize),

    #[error("Item has non-positive duration: {0}")]
    NonPositiveDuration(String),

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Resume file does not match this composition: {0}")]
    ResumeMismatch(String),
}

/// Decoder/encoder init or runtime failure, with the failing codec
/// identified as far as it is known.
#[derive(Error, Debug)]
#[error("{role} failure on {kind} track{}: {reason}", .name.as_deref().map(|n| format!(" ({n})")).unwrap_or_default())]
pub struct CodecError {
    pub kind: TrackKind,
    pub role: CodecRole,
    pub name: Option<String>,
    pub reason: String,
}

impl CodecError {
    pub fn new(kind: TrackKind, role: CodecRole, reason: impl Into<String>) -> Self {
        Self {
            kind,
            role,
            name: None,
            reason: reason.into(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_display_with_name() {
        let err = CodecError::new(TrackKind::Video, CodecRole::Decoder, "init failed")
            .named("hw-h264");
        let msg = err.to_string();
        assert!(msg.contains("decoder"));
        assert!(msg.contains("video"));
        assert!(msg.contains("hw-h264"));
        assert!(msg.contains("init failed"));
    }

    #[test]
    fn codec_error_display_without_name() {
        let err = CodecError::new(TrackKind::Audio, CodecRole::Encoder, "drained");
        let msg = err.to_string();
        assert!(msg.contains("encoder"));
        assert!(msg.contains("audio"));
        assert!(!msg.contains("("));
    }

    #[test]
    fn config_error_converts_to_engine_error() {
        let err: EngineError = ConfigError::EmptyComposition.into();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
