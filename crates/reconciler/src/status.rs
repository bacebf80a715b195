//! Status computed from the observed workload.

use chrono::{DateTime, Utc};

use webapp_core::{Condition, ConditionStatus, WebApp, WebAppStatus, Workload};

/// Condition type reporting whether every desired replica is available.
pub const READY: &str = "Ready";

/// Reason when available replicas match the declaration.
pub const REASON_READY: &str = "DeploymentReady";

/// Reason when available replicas fall short of the declaration.
pub const REASON_NOT_READY: &str = "DeploymentNotReady";

/// Status the declaration should carry given its workload.
///
/// Starts from the stored status so other condition types survive and the
/// ready transition time only moves when readiness flips.
#[must_use]
pub fn compute_status(webapp: &WebApp, workload: &Workload, now: DateTime<Utc>) -> WebAppStatus {
    let available = workload.status.available_replicas;
    let desired = webapp.spec.replicas;
    let ready = available == desired;

    let mut status = webapp.status.clone();
    status.available_replicas = available;
    status.set_condition(Condition {
        type_: READY.to_string(),
        status: ConditionStatus::from(ready),
        reason: if ready { REASON_READY } else { REASON_NOT_READY }.to_string(),
        message: format!("Deployment has {available}/{desired} replicas available"),
        last_transition_time: now,
    });
    status
}
