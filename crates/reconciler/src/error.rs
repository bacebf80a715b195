//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A store operation failed; the pass was aborted.
    #[error("store operation failed: {0}")]
    Store(#[from] webapp_core::Error),

    /// The controller was stopped.
    #[error("controller stopped")]
    Stopped,

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the pass lost an optimistic-concurrency race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    /// Whether the pass was aborted by shutdown.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Store(webapp_core::Error::Cancelled) | Self::Stopped)
    }
}
