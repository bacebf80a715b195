//! K8s-style reconciliation loop for WebApp declarations.
//!
//! This crate implements a level-triggered controller:
//!
//! - **Synthesize**: derive the desired Workload and Exposure from a WebApp
//! - **Diff**: compare desired against observed, existence first
//! - **Reconcile**: correct one mismatch per pass, then report status
//! - **Schedule**: a coalescing work queue with per-key backoff, fed by
//!   direct watches on WebApps and owner-mapped watches on dependents
//!
//! # Key Concepts
//!
//! ## Reconciliation
//!
//! Each pass re-reads everything from the store and returns a [`Requeue`]:
//! 1. WebApp gone: [`Requeue::Done`]
//! 2. Workload missing: create it, [`Requeue::Immediately`]
//! 3. Workload replicas differ: scale it, [`Requeue::Immediately`]
//! 4. Exposure missing: create it, [`Requeue::Immediately`]
//! 5. Otherwise write status if it changed, [`Requeue::After`] the resync interval
//!
//! Store failures abort the pass; the controller retries with backoff.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use webapp_core::{Kind, Scheme, Shutdown};
//! use webapp_reconciler::{Controller, Reconciler};
//! use webapp_store::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> webapp_reconciler::Result<()> {
//!     let scheme = Arc::new(Scheme::webapp_operator());
//!     let store = InMemoryStore::new_arc(scheme.clone());
//!     let reconciler = Reconciler::builder()
//!         .with_store(store.clone())
//!         .with_scheme(scheme.clone())
//!         .build()?;
//!
//!     Controller::builder()
//!         .with_store(store)
//!         .with_scheme(scheme)
//!         .with_reconciler(Arc::new(reconciler))
//!         .for_kind(Kind::WebApp)
//!         .owns(Kind::Workload)
//!         .owns(Kind::Exposure)
//!         .build()?
//!         .run(Shutdown::new())
//!         .await
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod backoff;
pub mod controller;
pub mod drift;
pub mod error;
pub mod ownership;
pub mod queue;
pub mod reconciler;
pub mod status;
pub mod synthesize;
pub mod types;

// Re-export main types
pub use backoff::{ExponentialBackoff, FailureRateLimiter};
pub use controller::{Controller, ControllerBuilder, EventMapping};
pub use error::{Error, Result};
pub use queue::WorkQueue;
pub use reconciler::{
    DEFAULT_RESYNC_INTERVAL, Reconcile, Reconciler, ReconcilerBuilder, ReconcilerConfig,
};
pub use types::{Action, Requeue};
