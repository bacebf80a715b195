//! Core types for the reconciler.

use std::fmt;
use std::time::Duration;

/// Scheduling directive returned by a successful reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Nothing further to do until the next change notification.
    Done,
    /// Run another pass as soon as a worker is free.
    Immediately,
    /// Run another pass after the given delay.
    After(Duration),
}

impl Requeue {
    /// Whether the pass changed something and wants to observe the result.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediately)
    }
}

/// Corrective action chosen by the drift detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Observed state already matches.
    NoOp,
    /// The dependent is missing and must be created.
    Create,
    /// The workload exists with the wrong replica count.
    UpdateReplicas(i32),
}

impl Action {
    /// Whether the action writes to the store.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => write!(f, "no-op"),
            Self::Create => write!(f, "create"),
            Self::UpdateReplicas(n) => write!(f, "update replicas to {n}"),
        }
    }
}
