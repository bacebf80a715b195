//! Immutable registry mapping kinds to their wire group/version/kind.
//!
//! Built once at startup with [`SchemeBuilder`] and shared by reference;
//! nothing can register a kind after [`SchemeBuilder::build`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;
use crate::types::Kind;

/// Group, version and kind name of an object type on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    /// Create a new group/version/kind triple.
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// `group/version`, or just `version` for the core group.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Frozen kind registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    kinds: BTreeMap<Kind, Gvk>,
}

impl Scheme {
    /// Start building a scheme.
    #[must_use]
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::new()
    }

    /// The registry used by the operator binary.
    #[must_use]
    pub fn webapp_operator() -> Self {
        Self::builder()
            .register(Kind::WebApp, Gvk::new("example.com", "v1", "WebApp"))
            .register(Kind::Workload, Gvk::new("apps", "v1", "Deployment"))
            .register(Kind::Exposure, Gvk::new("", "v1", "Service"))
            .build()
    }

    /// Look up the wire identity of a kind.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnregisteredKind` if the kind was never registered.
    pub fn gvk(&self, kind: Kind) -> Result<&Gvk> {
        self.kinds
            .get(&kind)
            .ok_or(Error::UnregisteredKind { kind })
    }

    /// Whether a kind was registered.
    #[must_use]
    pub fn recognizes(&self, kind: Kind) -> bool {
        self.kinds.contains_key(&kind)
    }

    /// Reverse lookup from a wire identity (as found in owner references).
    #[must_use]
    pub fn kind_for(&self, api_version: &str, kind: &str) -> Option<Kind> {
        self.kinds
            .iter()
            .find(|(_, gvk)| gvk.kind == kind && gvk.api_version() == api_version)
            .map(|(k, _)| *k)
    }
}

/// One-shot builder for [`Scheme`].
#[derive(Debug, Default)]
pub struct SchemeBuilder {
    kinds: BTreeMap<Kind, Gvk>,
}

impl SchemeBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind; registering the same kind twice keeps the last entry.
    #[must_use]
    pub fn register(mut self, kind: Kind, gvk: Gvk) -> Self {
        self.kinds.insert(kind, gvk);
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> Scheme {
        Scheme { kinds: self.kinds }
    }
}
