//! Daemon errors.

use thiserror::Error;

/// Daemon-level failures.
#[derive(Debug, Clone, Error)]
pub enum DaemonError {
    /// Bad or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Retryable failure; the inbound offset stays uncommitted
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Invariant breach; the worker stops
    #[error("Fatal pipeline failure: {0}")]
    Fatal(String),
}

/// Daemon result alias.
pub type DaemonResult<T> = Result<T, DaemonError>;
