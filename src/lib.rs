//! # webapp-operator
//!
//! Binary support for the WebApp convergence controller: configuration,
//! manifest loading and rendering, and the wiring that runs the controller
//! and the rollout simulator over an in-memory store.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod operator;

pub use config::OperatorConfig;
pub use error::{Error, Result};
pub use manifest::{ManifestLoader, render};
pub use operator::Operator;
