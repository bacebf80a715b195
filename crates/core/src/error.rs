//! Core error types for store operations.
//!
//! Absence, version conflicts and transient unavailability are distinct
//! variants so callers can branch on them without string matching.

use thiserror::Error;

use crate::types::{Kind, ObjectKey};

/// Core error type for store and object-model operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    // Store outcomes
    #[error("{kind} '{key}' not found")]
    NotFound { kind: Kind, key: ObjectKey },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    #[error("{kind} '{key}' was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("store unavailable during '{operation}': {reason}")]
    Unavailable { operation: String, reason: String },

    // Object model errors
    #[error("kind '{kind}' is not registered in the scheme")]
    UnregisteredKind { kind: Kind },

    #[error("'{child}' is already controlled by '{owner}'")]
    OwnershipConflict { child: ObjectKey, owner: String },

    #[error("invalid object: {reason}")]
    InvalidObject { reason: String },

    // Watch errors
    #[error("watch fell behind and missed {missed} events")]
    WatchLagged { missed: u64 },

    #[error("watch channel closed")]
    WatchClosed,

    #[error("operation cancelled by shutdown")]
    Cancelled,
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: Kind, key: &ObjectKey) -> Self {
        Self::NotFound {
            kind,
            key: key.clone(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: Kind, key: &ObjectKey) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.clone(),
        }
    }

    /// Create a version conflict error.
    pub fn conflict(kind: Kind, key: &ObjectKey, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            kind,
            key: key.clone(),
            expected,
            actual,
        }
    }

    /// Create a transient unavailability error.
    pub fn unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an ownership conflict error.
    pub fn ownership_conflict(child: &ObjectKey, owner: impl Into<String>) -> Self {
        Self::OwnershipConflict {
            child: child.clone(),
            owner: owner.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid_object(reason: impl Into<String>) -> Self {
        Self::InvalidObject {
            reason: reason.into(),
        }
    }

    /// The object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The object already exists.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// An optimistic-concurrency check failed.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Unavailable { .. } | Self::WatchLagged { .. }
        )
    }
}
