//! Kind-erased object handled by the store.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::exposure::Exposure;
use crate::types::{Kind, ObjectKey, ObjectMeta};
use crate::webapp::WebApp;
use crate::workload::Workload;

/// A concrete object type that can be stored.
pub trait Resource:
    Into<Object> + TryFrom<Object, Error = Error> + Clone + Send + Sync + 'static
{
    /// Kind tag of this type.
    const KIND: Kind;

    /// Metadata of the object.
    fn metadata(&self) -> &ObjectMeta;
}

/// Any object the store can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Object {
    WebApp(WebApp),
    Workload(Workload),
    Exposure(Exposure),
}

impl Object {
    /// Kind of the wrapped object.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::WebApp(_) => Kind::WebApp,
            Self::Workload(_) => Kind::Workload,
            Self::Exposure(_) => Kind::Exposure,
        }
    }

    /// Metadata of the wrapped object.
    #[must_use]
    pub const fn meta(&self) -> &ObjectMeta {
        match self {
            Self::WebApp(o) => &o.metadata,
            Self::Workload(o) => &o.metadata,
            Self::Exposure(o) => &o.metadata,
        }
    }

    /// Mutable metadata of the wrapped object.
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::WebApp(o) => &mut o.metadata,
            Self::Workload(o) => &mut o.metadata,
            Self::Exposure(o) => &mut o.metadata,
        }
    }

    /// Identity of the wrapped object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    /// Whether the user-authored parts of two objects of the same kind differ.
    #[must_use]
    pub fn spec_differs(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::WebApp(a), Self::WebApp(b)) => a.spec != b.spec,
            (Self::Workload(a), Self::Workload(b)) => a.spec != b.spec,
            (Self::Exposure(a), Self::Exposure(b)) => a.spec != b.spec,
            _ => true,
        }
    }

    /// Copy the status of `from` into this object, leaving spec and metadata alone.
    ///
    /// Exposures carry no status, so this is a no-op for them.
    pub fn take_status_from(&mut self, from: &Self) {
        match (self, from) {
            (Self::WebApp(a), Self::WebApp(b)) => a.status = b.status.clone(),
            (Self::Workload(a), Self::Workload(b)) => a.status = b.status.clone(),
            _ => {}
        }
    }
}

macro_rules! object_conversions {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Object {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }

            impl Resource for $variant {
                const KIND: Kind = Kind::$variant;

                fn metadata(&self) -> &ObjectMeta {
                    &self.metadata
                }
            }

            impl TryFrom<Object> for $variant {
                type Error = Error;

                fn try_from(object: Object) -> Result<Self, Self::Error> {
                    match object {
                        Object::$variant(inner) => Ok(inner),
                        other => Err(Error::invalid_object(format!(
                            "expected {}, got {} '{}'",
                            Kind::$variant,
                            other.kind(),
                            other.key()
                        ))),
                    }
                }
            }
        )*
    };
}

object_conversions!(WebApp, Workload, Exposure);
