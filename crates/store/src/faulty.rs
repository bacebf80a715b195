//! Fault-injecting store wrapper for tests.
//!
//! [`FaultyStore`] delegates to an inner store but can be told to fail the
//! next call of a given operation, and counts the writes that reached the
//! inner store.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use webapp_core::{Error, Kind, Object, ObjectKey, Result};

use crate::store::ObjectStore;
use crate::watch::WatchStream;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl Operation {
    const fn is_write(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::UpdateStatus | Self::Delete
        )
    }
}

/// Store wrapper with scripted failures and a write counter.
pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    faults: Mutex<BTreeMap<Operation, VecDeque<Error>>>,
    writes: AtomicUsize,
}

impl FaultyStore {
    /// Wrap a store.
    #[must_use]
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Make the next call of `operation` fail with `error`. Queued faults
    /// are consumed in order, one per call.
    pub async fn fail_next(&self, operation: Operation, error: Error) {
        self.faults
            .lock()
            .await
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Number of successful writes that reached the inner store.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Reset the write counter to zero.
    pub fn reset_write_count(&self) {
        self.writes.store(0, Ordering::Release);
    }

    async fn inject(&self, operation: Operation) -> Result<()> {
        let fault = self
            .faults
            .lock()
            .await
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(error) => {
                tracing::debug!(?operation, error = %error, "Injecting store fault");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn record<T>(&self, operation: Operation, result: Result<T>) -> Result<T> {
        if operation.is_write() && result.is_ok() {
            self.writes.fetch_add(1, Ordering::AcqRel);
        }
        result
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object> {
        self.inject(Operation::Get).await?;
        self.inner.get(kind, key).await
    }

    async fn list(&self, kind: Kind) -> Result<Vec<Object>> {
        self.inject(Operation::List).await?;
        self.inner.list(kind).await
    }

    async fn create(&self, object: Object) -> Result<Object> {
        self.inject(Operation::Create).await?;
        let result = self.inner.create(object).await;
        self.record(Operation::Create, result)
    }

    async fn update(&self, object: Object) -> Result<Object> {
        self.inject(Operation::Update).await?;
        let result = self.inner.update(object).await;
        self.record(Operation::Update, result)
    }

    async fn update_status(&self, object: Object) -> Result<Object> {
        self.inject(Operation::UpdateStatus).await?;
        let result = self.inner.update_status(object).await;
        self.record(Operation::UpdateStatus, result)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        self.inject(Operation::Delete).await?;
        let result = self.inner.delete(kind, key).await;
        self.record(Operation::Delete, result)
    }

    fn watch(&self, kind: Kind) -> WatchStream {
        self.inner.watch(kind)
    }
}

#[cfg(test)]
mod tests {
    use webapp_core::{Scheme, WebApp, WebAppSpec};

    use super::*;
    use crate::store::{InMemoryStore, StoreExt};

    fn faulty() -> FaultyStore {
        FaultyStore::new(InMemoryStore::new_arc(Arc::new(Scheme::webapp_operator())))
    }

    fn webapp() -> WebApp {
        WebApp::new("default", "nginx-app", WebAppSpec::new("nginx:1.25", 3))
    }

    #[tokio::test]
    async fn test_fault_fires_once() -> Result<()> {
        let store = faulty();
        store
            .fail_next(Operation::Create, Error::unavailable("create", "injected"))
            .await;

        let first = store.create_as(webapp()).await;
        assert!(matches!(first, Err(Error::Unavailable { .. })));

        store.create_as(webapp()).await?;
        assert_eq!(store.write_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reads_and_failed_writes_are_not_counted() -> Result<()> {
        let store = faulty();
        let created = store.create_as(webapp()).await?;
        store.reset_write_count();

        let _: WebApp = store.get_as(&created.metadata.key()).await?;
        store.list(Kind::WebApp).await?;
        let duplicate = store.create_as(webapp()).await;

        assert!(duplicate.is_err());
        assert_eq!(store.write_count(), 0);
        Ok(())
    }
}
