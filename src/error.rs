//! Error types for the operator binary.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for operator setup and manifest handling.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised before the controller starts or while loading manifests.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid manifest document {document}: {reason}")]
    Manifest { document: usize, reason: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Store(#[from] webapp_core::Error),

    #[error(transparent)]
    Reconciler(#[from] webapp_reconciler::Error),
}

impl Error {
    /// Create an IO error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a config parse error.
    pub fn config_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a manifest error for the 1-based document index.
    pub fn manifest(document: usize, reason: impl Into<String>) -> Self {
        Self::Manifest {
            document,
            reason: reason.into(),
        }
    }
}
