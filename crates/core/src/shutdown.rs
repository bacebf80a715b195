//! Shutdown signalling shared by the controller, its workers and the store helpers.
//!
//! A [`Shutdown`] is cheap to clone. Once triggered it stays triggered, so a
//! task that subscribes late still observes the signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Error;
use crate::result::Result;

/// Why shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownSignal {
    /// SIGTERM signal received
    Sigterm,
    /// SIGINT signal received (Ctrl+C)
    Sigint,
    /// Programmatic shutdown requested
    Programmatic,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
            Self::Programmatic => write!(f, "PROGRAMMATIC"),
        }
    }
}

/// Cloneable cancellation handle.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Fast path for synchronous checks.
    triggered: Arc<AtomicBool>,
    tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create a handle that has not been triggered.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. Repeated calls keep the first signal.
    pub fn trigger(&self, signal: ShutdownSignal) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(signal = %signal, "Shutdown already in progress, ignoring duplicate signal");
            return;
        }
        info!(signal = %signal, "Initiating graceful shutdown");
        self.tx.send_replace(Some(signal));
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// The signal that triggered shutdown, if any.
    #[must_use]
    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.rx.borrow()
    }

    /// Fail with `Error::Cancelled` once shutdown has been requested.
    ///
    /// Called at every store-operation boundary so a pass aborts promptly.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if shutdown was triggered.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_triggered() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once shutdown has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any handle, so this only errs if every handle is gone.
        let _ = rx.wait_for(Option::is_some).await;
    }
}
