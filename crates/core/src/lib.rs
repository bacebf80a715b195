//! Core types, errors and signals for the webapp operator.
//!
//! - **Object model**: the `WebApp` declaration and its two dependents,
//!   `Workload` and `Exposure`, plus the kind-erased [`Object`]
//! - **Scheme**: the immutable kind registry built once at startup
//! - **Errors**: the store error taxonomy shared by every crate
//! - **Shutdown**: the cancellation signal observed at store boundaries

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod exposure;
pub mod object;
pub mod result;
pub mod scheme;
pub mod shutdown;
pub mod types;
pub mod webapp;
pub mod workload;

pub use error::Error;
pub use exposure::{Exposure, ExposureSpec, ExposureType, Protocol, ServicePort};
pub use object::{Object, Resource};
pub use result::{Result, ResultExt};
pub use scheme::{Gvk, Scheme, SchemeBuilder};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use types::{EnvVar, Kind, Labels, ObjectKey, ObjectMeta, OwnerReference};
pub use webapp::{
    Condition, ConditionStatus, DEFAULT_PORT, MAX_REPLICAS, MIN_REPLICAS, WebApp, WebAppSpec,
    WebAppStatus,
};
pub use workload::{Container, ContainerPort, PodTemplate, Workload, WorkloadSpec, WorkloadStatus};
