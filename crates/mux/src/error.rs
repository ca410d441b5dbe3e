//! Muxer error types.

use thiserror::Error;

/// Errors that can occur while writing an output container.
#[derive(Error, Debug)]
pub enum MuxError {
    /// I/O error during container write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid track or container configuration.
    #[error("Invalid muxer config: {0}")]
    InvalidConfig(String),

    /// Unknown track token or track misuse.
    #[error("Track error: {0}")]
    Track(String),

    /// A box or sample table exceeded format limits.
    #[error("Oversized: {0}")]
    Oversized(String),

    /// The muxer is unrecoverably broken; `close()` could not finalize.
    ///
    /// Distinct from the other variants: any other write error is
    /// fatal-but-closeable, while `Broken` means the output file must be
    /// considered garbage.
    #[error("Muxer broken: {0}")]
    Broken(String),
}

/// Convenience Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = MuxError::from(io_err);
        assert!(err.to_string().contains("IO error"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn display_invalid_config() {
        let err = MuxError::InvalidConfig("missing codec".into());
        assert_eq!(err.to_string(), "Invalid muxer config: missing codec");
    }

    #[test]
    fn display_track() {
        let err = MuxError::Track("unknown track token 5".into());
        assert_eq!(err.to_string(), "Track error: unknown track token 5");
    }

    #[test]
    fn display_broken() {
        let err = MuxError::Broken("mdat patch failed".into());
        assert!(err.to_string().starts_with("Muxer broken"));
    }
}
