//! Object store trait and implementations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use itertools::Itertools;
use tokio::sync::RwLock;
use ulid::Ulid;

use webapp_core::{Error, Kind, Object, ObjectKey, Resource, Result, Scheme};

use crate::watch::{ChangeKind, WatchBus, WatchEvent, WatchStream};

/// Trait for object storage backends.
///
/// Every write is version-checked: `update` and `update_status` fail with
/// `Error::Conflict` when the submitted `resource_version` is stale.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object.
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object>;

    /// Fetch every object of a kind.
    async fn list(&self, kind: Kind) -> Result<Vec<Object>>;

    /// Store a new object.
    async fn create(&self, object: Object) -> Result<Object>;

    /// Replace the spec and metadata of an object; the stored status is kept.
    async fn update(&self, object: Object) -> Result<Object>;

    /// Replace the status of an object; the stored spec and metadata are kept.
    async fn update_status(&self, object: Object) -> Result<Object>;

    /// Remove an object and, through owner references, everything it owns.
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()>;

    /// Subscribe to changes of one kind.
    fn watch(&self, kind: Kind) -> WatchStream;
}

/// Typed conveniences over [`ObjectStore`].
#[async_trait]
pub trait StoreExt: ObjectStore {
    /// Fetch an object as its concrete type.
    async fn get_as<T: Resource>(&self, key: &ObjectKey) -> Result<T>;

    /// Create an object and return the stored copy.
    async fn create_as<T: Resource>(&self, object: T) -> Result<T>;

    /// Update an object's spec and return the stored copy.
    async fn update_as<T: Resource>(&self, object: T) -> Result<T>;

    /// Update an object's status and return the stored copy.
    async fn update_status_as<T: Resource>(&self, object: T) -> Result<T>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> StoreExt for S {
    async fn get_as<T: Resource>(&self, key: &ObjectKey) -> Result<T> {
        T::try_from(self.get(T::KIND, key).await?)
    }

    async fn create_as<T: Resource>(&self, object: T) -> Result<T> {
        T::try_from(self.create(object.into()).await?)
    }

    async fn update_as<T: Resource>(&self, object: T) -> Result<T> {
        T::try_from(self.update(object.into()).await?)
    }

    async fn update_status_as<T: Resource>(&self, object: T) -> Result<T> {
        T::try_from(self.update_status(object.into()).await?)
    }
}

type Objects = BTreeMap<(Kind, ObjectKey), Object>;

/// In-memory object store.
///
/// Behaves like an API server for the parts the operator depends on:
/// uid assignment, versioned writes, separate status writes, watch
/// notifications and background cascade deletion through owner references.
pub struct InMemoryStore {
    scheme: Arc<Scheme>,
    objects: RwLock<Objects>,
    last_version: AtomicU64,
    bus: WatchBus,
}

impl InMemoryStore {
    /// Create an empty store that accepts the kinds registered in `scheme`.
    #[must_use]
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self::with_bus(scheme, WatchBus::default())
    }

    /// Create an empty store publishing through the given bus.
    #[must_use]
    pub fn with_bus(scheme: Arc<Scheme>, bus: WatchBus) -> Self {
        Self {
            scheme,
            objects: RwLock::new(BTreeMap::new()),
            last_version: AtomicU64::new(0),
            bus,
        }
    }

    /// Create a new in-memory store wrapped in an Arc.
    #[must_use]
    pub fn new_arc(scheme: Arc<Scheme>) -> Arc<Self> {
        Arc::new(Self::new(scheme))
    }

    /// Total number of stored objects across kinds.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn next_version(&self) -> u64 {
        self.last_version
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }

    fn admit(&self, object: &Object) -> Result<()> {
        if !self.scheme.recognizes(object.kind()) {
            return Err(Error::UnregisteredKind {
                kind: object.kind(),
            });
        }
        let meta = object.meta();
        if meta.name.is_empty() || meta.namespace.is_empty() {
            return Err(Error::invalid_object(format!(
                "{} must have a name and a namespace",
                object.kind()
            )));
        }
        Ok(())
    }

    fn current<'a>(objects: &'a Objects, incoming: &Object) -> Result<&'a Object> {
        let key = incoming.key();
        let current = objects
            .get(&(incoming.kind(), key.clone()))
            .ok_or_else(|| Error::not_found(incoming.kind(), &key))?;
        let expected = incoming.meta().resource_version;
        let actual = current.meta().resource_version;
        if expected != actual {
            return Err(Error::conflict(incoming.kind(), &key, expected, actual));
        }
        Ok(current)
    }

    /// Remove every object whose owner chain leads to one of `uids`.
    fn collect_garbage(objects: &mut Objects, uids: BTreeSet<String>) -> Vec<Object> {
        let mut removed = Vec::new();
        let mut pending = uids;
        while !pending.is_empty() {
            let orphans = objects
                .iter()
                .filter(|(_, o)| {
                    o.meta()
                        .owner_references
                        .iter()
                        .any(|r| pending.contains(&r.uid))
                })
                .map(|(k, _)| k.clone())
                .collect_vec();
            pending = orphans
                .into_iter()
                .filter_map(|k| objects.remove(&k))
                .map(|o| {
                    let uid = o.meta().uid.clone();
                    removed.push(o);
                    uid
                })
                .collect();
        }
        removed
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object> {
        self.objects
            .read()
            .await
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found(kind, key))
    }

    async fn list(&self, kind: Kind) -> Result<Vec<Object>> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, o)| o.clone())
            .collect_vec())
    }

    async fn create(&self, mut object: Object) -> Result<Object> {
        self.admit(&object)?;
        let kind = object.kind();
        let key = object.key();

        let mut objects = self.objects.write().await;
        if objects.contains_key(&(kind, key.clone())) {
            return Err(Error::already_exists(kind, &key));
        }

        let meta = object.meta_mut();
        meta.uid = Ulid::new().to_string();
        meta.resource_version = self.next_version();
        meta.generation = 1;
        meta.creation_timestamp = Some(Utc::now());

        objects.insert((kind, key), object.clone());
        self.bus
            .publish(WatchEvent::new(ChangeKind::Created, object.clone()));
        Ok(object)
    }

    async fn update(&self, mut object: Object) -> Result<Object> {
        self.admit(&object)?;
        let mut objects = self.objects.write().await;
        let current = Self::current(&objects, &object)?;

        let generation = if current.spec_differs(&object) {
            current.meta().generation.saturating_add(1)
        } else {
            current.meta().generation
        };
        let uid = current.meta().uid.clone();
        let created = current.meta().creation_timestamp;
        object.take_status_from(current);

        let meta = object.meta_mut();
        meta.uid = uid;
        meta.creation_timestamp = created;
        meta.generation = generation;
        meta.resource_version = self.next_version();

        objects.insert((object.kind(), object.key()), object.clone());
        self.bus
            .publish(WatchEvent::new(ChangeKind::Updated, object.clone()));
        Ok(object)
    }

    async fn update_status(&self, object: Object) -> Result<Object> {
        let mut objects = self.objects.write().await;
        let mut stored = Self::current(&objects, &object)?.clone();

        stored.take_status_from(&object);
        stored.meta_mut().resource_version = self.next_version();

        objects.insert((stored.kind(), stored.key()), stored.clone());
        self.bus
            .publish(WatchEvent::new(ChangeKind::Updated, stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        let mut objects = self.objects.write().await;
        let removed = objects
            .remove(&(kind, key.clone()))
            .ok_or_else(|| Error::not_found(kind, key))?;

        let owned = Self::collect_garbage(
            &mut objects,
            BTreeSet::from([removed.meta().uid.clone()]),
        );

        tracing::debug!(
            kind = %kind,
            key = %key,
            cascaded = owned.len(),
            "Deleted object"
        );
        std::iter::once(removed)
            .chain(owned)
            .for_each(|o| self.bus.publish(WatchEvent::new(ChangeKind::Deleted, o)));
        Ok(())
    }

    fn watch(&self, kind: Kind) -> WatchStream {
        self.bus.subscribe(kind)
    }
}

/// A wrapper that adds tracing to an object store.
pub struct TracingStore<S: ObjectStore> {
    inner: S,
}

impl<S: ObjectStore> TracingStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TracingStore<S> {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object> {
        tracing::debug!(kind = %kind, key = %key, "Getting object");
        self.inner.get(kind, key).await
    }

    async fn list(&self, kind: Kind) -> Result<Vec<Object>> {
        tracing::debug!(kind = %kind, "Listing objects");
        self.inner.list(kind).await
    }

    async fn create(&self, object: Object) -> Result<Object> {
        tracing::debug!(kind = %object.kind(), key = %object.key(), "Creating object");
        let result = self.inner.create(object).await;
        if let Ok(ref stored) = result {
            tracing::trace!(uid = %stored.meta().uid, "Object created");
        }
        result
    }

    async fn update(&self, object: Object) -> Result<Object> {
        tracing::debug!(
            kind = %object.kind(),
            key = %object.key(),
            version = object.meta().resource_version,
            "Updating object"
        );
        self.inner.update(object).await
    }

    async fn update_status(&self, object: Object) -> Result<Object> {
        tracing::debug!(
            kind = %object.kind(),
            key = %object.key(),
            version = object.meta().resource_version,
            "Updating object status"
        );
        self.inner.update_status(object).await
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        tracing::debug!(kind = %kind, key = %key, "Deleting object");
        self.inner.delete(kind, key).await
    }

    fn watch(&self, kind: Kind) -> WatchStream {
        tracing::debug!(kind = %kind, "Opening watch");
        self.inner.watch(kind)
    }
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object> {
        (**self).get(kind, key).await
    }

    async fn list(&self, kind: Kind) -> Result<Vec<Object>> {
        (**self).list(kind).await
    }

    async fn create(&self, object: Object) -> Result<Object> {
        (**self).create(object).await
    }

    async fn update(&self, object: Object) -> Result<Object> {
        (**self).update(object).await
    }

    async fn update_status(&self, object: Object) -> Result<Object> {
        (**self).update_status(object).await
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        (**self).delete(kind, key).await
    }

    fn watch(&self, kind: Kind) -> WatchStream {
        (**self).watch(kind)
    }
}
