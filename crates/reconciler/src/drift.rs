//! Drift detection between desired and observed dependents.
//!
//! Existence is checked before content. Only the workload replica count is
//! corrected on an existing object; image, port and environment are applied
//! at creation time only, and an existing exposure is never compared.

use webapp_core::{Exposure, Workload};

use crate::types::Action;

/// Action needed to bring the observed workload to the desired one.
#[must_use]
pub fn diff_workload(desired: &Workload, observed: Option<&Workload>) -> Action {
    match observed {
        None => Action::Create,
        Some(current) if current.spec.replicas != desired.spec.replicas => {
            Action::UpdateReplicas(desired.spec.replicas)
        }
        Some(_) => Action::NoOp,
    }
}

/// Action needed for the exposure.
#[must_use]
pub const fn diff_exposure(observed: Option<&Exposure>) -> Action {
    match observed {
        None => Action::Create,
        Some(_) => Action::NoOp,
    }
}
