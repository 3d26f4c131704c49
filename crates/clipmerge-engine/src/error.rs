//! Engine error types.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures that abort a merge pass.
///
/// Per-pair problems (no alignment, undecodable media, failed renders) are
/// not errors; they are reported as [`PairOutcome`](crate::PairOutcome)s.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] clipmerge_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] clipmerge_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
