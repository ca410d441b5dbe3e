//! Export error taxonomy.
//!
//! Trim optimization fallbacks are deliberately absent here: they are
//! recorded decisions, not errors (see [`crate::trim::TrimOptimization`]).

use thiserror::Error;

use splice_common::{CodecError, ConfigError};
use splice_mux::MuxError;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Mux error: {0}")]
    Mux(#[from] MuxError),

    #[error("Invalid export config: {0}")]
    InvalidConfig(String),

    #[error("Export worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts() {
        let err: ExportError = ConfigError::EmptyComposition.into();
        assert!(matches!(err, ExportError::Config(_)));
        assert!(err.to_string().contains("at least one sequence"));
    }

    #[test]
    fn mux_error_converts() {
        let err: ExportError = MuxError::Broken("finalize failed".to_string()).into();
        assert!(err.to_string().contains("finalize failed"));
    }
}
