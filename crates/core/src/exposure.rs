//! The Exposure dependent, shaped like a core/v1 Service.

use serde::{Deserialize, Serialize};

use crate::types::{Labels, ObjectMeta};

/// Transport protocol of an exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// How the exposure is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExposureType {
    #[default]
    ClusterIP,
    NodePort,
}

/// Mapping from an externally visible port to a container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
    pub target_port: i32,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Desired shape of the exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureSpec {
    pub selector: Labels,
    pub ports: Vec<ServicePort>,
    #[serde(default, rename = "type")]
    pub exposure_type: ExposureType,
}

/// Network entry point selecting the workload's pods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exposure {
    pub metadata: ObjectMeta,
    pub spec: ExposureSpec,
}
