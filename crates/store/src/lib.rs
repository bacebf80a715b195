//! Object store seam for the webapp operator.
//!
//! - **`ObjectStore`**: get/list/create/update/update-status/delete/watch
//!   with optimistic concurrency on every write
//! - **`InMemoryStore`**: API-server-like backend with cascade deletion
//!   through owner references
//! - **`FaultyStore`**: scripted failures and write counting for tests
//! - **`RolloutSimulator`**: reports workload replicas as available

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod faulty;
pub mod rollout;
pub mod store;
pub mod watch;

pub use faulty::{FaultyStore, Operation};
pub use rollout::RolloutSimulator;
pub use store::{InMemoryStore, ObjectStore, StoreExt, TracingStore};
pub use watch::{ChangeKind, DEFAULT_WATCH_CAPACITY, WatchBus, WatchEvent, WatchStream};
