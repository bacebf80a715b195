//! The WebApp declaration: user-authored spec plus controller-authored status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;
use crate::types::{EnvVar, ObjectMeta};

/// Port used when the spec leaves it unset.
pub const DEFAULT_PORT: i32 = 8080;

/// Inclusive bounds for `spec.replicas`.
pub const MIN_REPLICAS: i32 = 1;
pub const MAX_REPLICAS: i32 = 10;

/// Desired application state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAppSpec {
    pub image: String,
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl WebAppSpec {
    /// Create a spec with the given image and replica count.
    pub fn new(image: impl Into<String>, replicas: i32) -> Self {
        Self {
            image: image.into(),
            replicas,
            port: None,
            env: Vec::new(),
        }
    }

    /// Set the container port.
    #[must_use]
    pub const fn with_port(mut self, port: i32) -> Self {
        self.port = Some(port);
        self
    }

    /// Append an environment entry.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar::new(name, value));
        self
    }

    /// The port the container listens on; unset and zero fall back to the default.
    #[must_use]
    pub fn effective_port(&self) -> i32 {
        self.port.filter(|p| *p > 0).unwrap_or(DEFAULT_PORT)
    }

    /// Check the spec against the declaration schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidObject` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(Error::invalid_object("spec.image must not be empty"));
        }
        if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&self.replicas) {
            return Err(Error::invalid_object(format!(
                "spec.replicas must be between {MIN_REPLICAS} and {MAX_REPLICAS}, got {}",
                self.replicas
            )));
        }
        // Zero is the same as unset: `effective_port` falls back to the default.
        if let Some(port) = self.port.filter(|p| *p != 0) {
            if !(1..=65535).contains(&port) {
                return Err(Error::invalid_object(format!(
                    "spec.port must be between 1 and 65535 (0 selects the default), got {port}"
                )));
            }
        }
        Ok(())
    }
}

/// Tri-state value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// One observed aspect of convergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Observed state, written only by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAppStatus {
    #[serde(default)]
    pub available_replicas: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl WebAppStatus {
    /// Find a condition by type.
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace the condition of the same type.
    ///
    /// The stored transition time is kept unless the status value changes.
    pub fn set_condition(&mut self, mut condition: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }
}

/// The declaration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebApp {
    pub metadata: ObjectMeta,
    pub spec: WebAppSpec,
    #[serde(default)]
    pub status: WebAppStatus,
}

impl WebApp {
    /// Create a new declaration with empty status.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: WebAppSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: WebAppStatus::default(),
        }
    }
}
