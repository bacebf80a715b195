//! Simulated rollout of workloads.
//!
//! Stands in for the cluster side of a Deployment: after a configurable
//! delay every workload reports all of its desired replicas as available.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use webapp_core::{Error, Kind, Object, ObjectKey, Result, Shutdown, Workload};

use crate::store::{ObjectStore, StoreExt};
use crate::watch::ChangeKind;

/// Marks workload replicas available once the rollout delay has passed.
pub struct RolloutSimulator {
    store: Arc<dyn ObjectStore>,
    delay: Duration,
}

impl RolloutSimulator {
    /// Create a simulator settling workloads after `delay`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, delay: Duration) -> Self {
        Self { store, delay }
    }

    /// Watch workloads until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial list fails or the watch closes.
    pub async fn run(self, shutdown: Shutdown) -> Result<()> {
        let mut stream = self.store.watch(Kind::Workload);
        info!(delay = ?self.delay, "Rollout simulator started");
        self.relist(&shutdown).await?;

        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                event = stream.recv() => event,
            };
            match event {
                Ok(event) if event.change != ChangeKind::Deleted => {
                    if let Object::Workload(workload) = event.object {
                        self.schedule(&workload, &shutdown);
                    }
                }
                Ok(_) => {}
                Err(Error::WatchLagged { missed }) => {
                    warn!(missed, "Rollout simulator lagged, relisting workloads");
                    self.relist(&shutdown).await?;
                }
                Err(e) => return Err(e),
            }
        }

        info!("Rollout simulator stopped");
        Ok(())
    }

    async fn relist(&self, shutdown: &Shutdown) -> Result<()> {
        for object in self.store.list(Kind::Workload).await? {
            if let Object::Workload(workload) = object {
                self.schedule(&workload, shutdown);
            }
        }
        Ok(())
    }

    fn schedule(&self, workload: &Workload, shutdown: &Shutdown) {
        if workload.status.available_replicas == workload.spec.replicas {
            return;
        }
        let store = Arc::clone(&self.store);
        let delay = self.delay;
        let key = workload.metadata.key();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = settle(store.as_ref(), &key).await {
                        debug!(key = %key, error = %e, "Rollout settle skipped");
                    }
                }
            }
        });
    }
}

/// Bring a workload's available replicas up to its desired count.
async fn settle(store: &dyn ObjectStore, key: &ObjectKey) -> Result<()> {
    let mut workload: Workload = store.get_as(key).await?;
    if workload.status.available_replicas == workload.spec.replicas {
        return Ok(());
    }
    workload.status.available_replicas = workload.spec.replicas;
    let stored = store.update_status_as(workload).await?;
    debug!(
        key = %key,
        available = stored.status.available_replicas,
        "Workload rollout settled"
    );
    Ok(())
}
