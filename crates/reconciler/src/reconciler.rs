//! Reconciler implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use webapp_core::{
    Exposure, ObjectKey, ObjectMeta, Resource, ResultExt, Scheme, Shutdown, WebApp, Workload,
};
use webapp_store::{ObjectStore, StoreExt};

use crate::drift::{diff_exposure, diff_workload};
use crate::error::{Error, Result};
use crate::ownership::is_controlled_by;
use crate::status::compute_status;
use crate::synthesize::{exposure_for, workload_for};
use crate::types::{Action, Requeue};

/// Default interval between periodic re-checks of a converged declaration.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Delay before re-checking a declaration after a successful pass.
    pub resync_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

/// A single reconciliation entry point, driven by the controller.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Run one pass for the declaration identified by `key`.
    async fn reconcile(&self, key: &ObjectKey, shutdown: &Shutdown) -> Result<Requeue>;
}

/// K8s-style reconciler for WebApp declarations.
///
/// Every pass re-reads the declaration and its dependents, corrects at most
/// one mismatch and asks to be requeued so the next pass sees the result.
pub struct Reconciler {
    /// Store holding declarations and dependents.
    store: Arc<dyn ObjectStore>,
    /// Kind registry used for owner references.
    scheme: Arc<Scheme>,
    /// Configuration.
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(store: Arc<dyn ObjectStore>, scheme: Arc<Scheme>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            scheme,
            config,
        }
    }

    /// Start building a reconciler.
    #[must_use]
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new()
    }

    /// Drive the dependents of `key` one step toward its declaration.
    ///
    /// A missing declaration means it was deleted; the store already removed
    /// its dependents, so the pass succeeds with [`Requeue::Done`].
    ///
    /// # Errors
    ///
    /// Any store failure aborts the pass and is returned unchanged for the
    /// caller to retry with backoff. Returns a cancelled error if `shutdown`
    /// was triggered before a store operation.
    pub async fn reconcile(&self, key: &ObjectKey, shutdown: &Shutdown) -> Result<Requeue> {
        shutdown.checkpoint()?;
        let Some(webapp) = self.store.get_as::<WebApp>(key).await.found()? else {
            debug!(webapp = %key, "WebApp not found, assuming deleted");
            return Ok(Requeue::Done);
        };

        debug!(
            webapp = %key,
            generation = webapp.metadata.generation,
            "Starting reconciliation"
        );

        shutdown.checkpoint()?;
        let desired = workload_for(&webapp, &self.scheme)?;
        let workload = match self.store.get_as::<Workload>(key).await.found()? {
            None => return self.create_dependent(desired, shutdown).await,
            Some(current) => current,
        };
        Self::check_owner(&workload.metadata, &webapp);

        if let Action::UpdateReplicas(replicas) = diff_workload(&desired, Some(&workload)) {
            return self.scale(workload, replicas, shutdown).await;
        }

        shutdown.checkpoint()?;
        let exposure = self.store.get_as::<Exposure>(key).await.found()?;
        if diff_exposure(exposure.as_ref()) == Action::Create {
            return self.create_dependent(exposure_for(&webapp, &self.scheme)?, shutdown).await;
        }
        if let Some(exposure) = &exposure {
            Self::check_owner(&exposure.metadata, &webapp);
        }

        self.write_status(webapp, &workload, shutdown).await?;
        Ok(Requeue::After(self.config.resync_interval))
    }

    /// Create a missing dependent and ask for an immediate re-check.
    async fn create_dependent<T: Resource>(&self, object: T, shutdown: &Shutdown) -> Result<Requeue> {
        shutdown.checkpoint()?;
        let key = object.metadata().key();
        match self.store.create_as(object).await {
            Ok(created) => {
                info!(
                    kind = %T::KIND,
                    key = %key,
                    uid = %created.metadata().uid,
                    "Created dependent"
                );
            }
            Err(e) if e.is_already_exists() => {
                // Created by a concurrent pass or an external actor; re-read next pass.
                debug!(kind = %T::KIND, key = %key, "Dependent already exists");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Requeue::Immediately)
    }

    async fn scale(&self, mut workload: Workload, replicas: i32, shutdown: &Shutdown) -> Result<Requeue> {
        let from = workload.spec.replicas;
        workload.spec.replicas = replicas;
        let key = workload.metadata.key();

        shutdown.checkpoint()?;
        self.store
            .update_as(workload)
            .await
            .inspect_error(|e| debug!(workload = %key, error = %e, "Replica update rejected"))?;

        info!(workload = %key, from, to = replicas, "Updated workload replicas");
        Ok(Requeue::Immediately)
    }

    async fn write_status(&self, mut webapp: WebApp, workload: &Workload, shutdown: &Shutdown) -> Result<()> {
        let status = compute_status(&webapp, workload, Utc::now());
        if status == webapp.status {
            debug!(webapp = %webapp.metadata.key(), "Status unchanged");
            return Ok(());
        }

        let key = webapp.metadata.key();
        let available = status.available_replicas;
        webapp.status = status;

        shutdown.checkpoint()?;
        self.store.update_status_as(webapp).await?;
        info!(webapp = %key, available, "Updated WebApp status");
        Ok(())
    }

    /// Dependents found without our controller reference are reported, not adopted.
    fn check_owner(meta: &ObjectMeta, webapp: &WebApp) {
        if !is_controlled_by(meta, webapp) {
            warn!(
                dependent = %meta.key(),
                webapp = %webapp.metadata.key(),
                "Dependent is not controlled by its WebApp; cascade deletion will not remove it"
            );
        }
    }

    /// Get the store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Get the scheme.
    #[must_use]
    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

#[async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(&self, key: &ObjectKey, shutdown: &Shutdown) -> Result<Requeue> {
        Self::reconcile(self, key, shutdown).await
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    scheme: Option<Arc<Scheme>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            scheme: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the scheme; defaults to [`Scheme::webapp_operator`].
    #[must_use]
    pub fn with_scheme(mut self, scheme: Arc<Scheme>) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the periodic re-check interval.
    #[must_use]
    pub const fn resync_interval(mut self, interval: Duration) -> Self {
        self.config.resync_interval = interval;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if no store was set or the resync
    /// interval is zero.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("store is required"))?;

        if self.config.resync_interval.is_zero() {
            return Err(Error::invalid_config("resync interval must be positive"));
        }

        let scheme = self
            .scheme
            .unwrap_or_else(|| Arc::new(Scheme::webapp_operator()));

        Ok(Reconciler::new(store, scheme, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use webapp_core::{ConditionStatus, Kind, ShutdownSignal, WebAppSpec};
    use webapp_store::{FaultyStore, InMemoryStore, Operation};

    use super::*;
    use crate::status::{READY, REASON_NOT_READY, REASON_READY};

    struct Fixture {
        store: Arc<InMemoryStore>,
        faulty: Arc<FaultyStore>,
        reconciler: Reconciler,
        shutdown: Shutdown,
    }

    fn setup() -> Fixture {
        let scheme = Arc::new(Scheme::webapp_operator());
        let store = InMemoryStore::new_arc(Arc::clone(&scheme));
        let faulty = Arc::new(FaultyStore::new(store.clone()));
        let reconciler = Reconciler::new(faulty.clone(), scheme, ReconcilerConfig::default());
        Fixture {
            store,
            faulty,
            reconciler,
            shutdown: Shutdown::new(),
        }
    }

    async fn declare(fixture: &Fixture, replicas: i32) -> webapp_core::Result<WebApp> {
        let spec = WebAppSpec::new("nginx:1.25", replicas).with_port(80);
        fixture
            .store
            .create_as(WebApp::new("default", "nginx-app", spec))
            .await
    }

    async fn report_available(fixture: &Fixture, key: &ObjectKey, available: i32) -> webapp_core::Result<()> {
        let mut workload: Workload = fixture.store.get_as(key).await?;
        workload.status.available_replicas = available;
        fixture.store.update_status_as(workload).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_converges_in_three_passes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let webapp = declare(&fixture, 3).await?;
        let key = webapp.metadata.key();

        // Pass 1 creates the workload
        let first = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(first, Requeue::Immediately);
        let workload: Workload = fixture.store.get_as(&key).await?;
        assert_eq!(workload.spec.replicas, 3);
        assert_eq!(workload.spec.template.container.image, "nginx:1.25");
        assert_eq!(
            workload.spec.template.container.ports.first().map(|p| p.container_port),
            Some(80)
        );
        assert!(is_controlled_by(&workload.metadata, &webapp));
        assert!(fixture.store.get(Kind::Exposure, &key).await.is_err());

        // Pass 2 creates the exposure
        let second = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(second, Requeue::Immediately);
        let exposure: Exposure = fixture.store.get_as(&key).await?;
        assert_eq!(exposure.spec.selector, workload.spec.template.labels);
        assert!(is_controlled_by(&exposure.metadata, &webapp));

        // Pass 3 reports readiness once replicas are available
        report_available(&fixture, &key, 3).await?;
        let third = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(third, Requeue::After(Duration::from_secs(30)));

        let stored: WebApp = fixture.store.get_as(&key).await?;
        assert_eq!(stored.status.available_replicas, 3);
        let ready = stored.status.condition(READY);
        assert_eq!(ready.map(|c| c.status), Some(ConditionStatus::True));
        assert_eq!(ready.map(|c| c.reason.as_str()), Some(REASON_READY));
        Ok(())
    }

    #[tokio::test]
    async fn test_converged_pass_writes_nothing() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let key = declare(&fixture, 2).await?.metadata.key();
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        report_available(&fixture, &key, 2).await?;
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;

        fixture.faulty.reset_write_count();
        let before: WebApp = fixture.store.get_as(&key).await?;
        let requeue = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        let after: WebApp = fixture.store.get_as(&key).await?;

        assert_eq!(requeue, Requeue::After(DEFAULT_RESYNC_INTERVAL));
        assert_eq!(fixture.faulty.write_count(), 0);
        assert_eq!(before.metadata.resource_version, after.metadata.resource_version);
        Ok(())
    }

    #[tokio::test]
    async fn test_scale_up_updates_replicas_then_reports() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let key = declare(&fixture, 3).await?.metadata.key();
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        report_available(&fixture, &key, 3).await?;
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;

        let mut webapp: WebApp = fixture.store.get_as(&key).await?;
        webapp.spec.replicas = 5;
        fixture.store.update_as(webapp).await?;

        let requeue = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(requeue, Requeue::Immediately);
        let workload: Workload = fixture.store.get_as(&key).await?;
        assert_eq!(workload.spec.replicas, 5);

        let requeue = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(requeue, Requeue::After(DEFAULT_RESYNC_INTERVAL));
        let stored: WebApp = fixture.store.get_as(&key).await?;
        let ready = stored.status.condition(READY);
        assert_eq!(ready.map(|c| c.status), Some(ConditionStatus::False));
        assert_eq!(ready.map(|c| c.reason.as_str()), Some(REASON_NOT_READY));
        assert_eq!(
            ready.map(|c| c.message.as_str()),
            Some("Deployment has 3/5 replicas available")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_recreates_deleted_workload() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let key = declare(&fixture, 3).await?.metadata.key();
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        let original: Workload = fixture.store.get_as(&key).await?;

        fixture.store.delete(Kind::Workload, &key).await?;
        let requeue = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;

        assert_eq!(requeue, Requeue::Immediately);
        let recreated: Workload = fixture.store.get_as(&key).await?;
        assert_eq!(recreated.spec, original.spec);
        assert_eq!(recreated.metadata.labels, original.metadata.labels);
        assert_eq!(recreated.metadata.owner_references, original.metadata.owner_references);
        assert_ne!(recreated.metadata.uid, original.metadata.uid);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_webapp_is_done() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let requeue = fixture
            .reconciler
            .reconcile(&ObjectKey::new("default", "gone"), &fixture.shutdown)
            .await?;
        assert_eq!(requeue, Requeue::Done);
        assert_eq!(fixture.faulty.write_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_failure_aborts_pass() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let key = declare(&fixture, 3).await?.metadata.key();
        fixture.faulty.reset_write_count();
        fixture
            .faulty
            .fail_next(Operation::Create, webapp_core::Error::unavailable("create", "connection reset"))
            .await;

        let result = fixture.reconciler.reconcile(&key, &fixture.shutdown).await;
        assert!(matches!(
            result,
            Err(Error::Store(webapp_core::Error::Unavailable { .. }))
        ));
        assert_eq!(fixture.faulty.write_count(), 0);

        let retried = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(retried, Requeue::Immediately);
        Ok(())
    }

    #[tokio::test]
    async fn test_status_conflict_is_reported() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let key = declare(&fixture, 1).await?.metadata.key();
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        fixture
            .faulty
            .fail_next(
                Operation::UpdateStatus,
                webapp_core::Error::conflict(Kind::WebApp, &key, 1, 2),
            )
            .await;

        let result = fixture.reconciler.reconcile(&key, &fixture.shutdown).await;
        assert!(result.is_err_and(|e| e.is_conflict()));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_create_requeues() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let key = declare(&fixture, 1).await?.metadata.key();
        fixture
            .faulty
            .fail_next(Operation::Create, webapp_core::Error::already_exists(Kind::Workload, &key))
            .await;

        let requeue = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(requeue, Requeue::Immediately);
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_cancels_before_store_calls() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let key = declare(&fixture, 1).await?.metadata.key();
        fixture.faulty.reset_write_count();
        fixture.shutdown.trigger(ShutdownSignal::Programmatic);

        let result = fixture.reconciler.reconcile(&key, &fixture.shutdown).await;
        assert!(result.is_err_and(|e| e.is_cancelled()));
        assert_eq!(fixture.faulty.write_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unowned_dependent_is_left_alone() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fixture = setup();
        let webapp = declare(&fixture, 2).await?;
        let key = webapp.metadata.key();
        let mut stray = workload_for(&webapp, fixture.reconciler.scheme())?;
        stray.metadata.owner_references.clear();
        fixture.store.create_as(stray).await?;

        let requeue = fixture.reconciler.reconcile(&key, &fixture.shutdown).await?;
        assert_eq!(requeue, Requeue::Immediately);
        let workload: Workload = fixture.store.get_as(&key).await?;
        assert!(workload.metadata.owner_references.is_empty());
        assert!(fixture.store.get(Kind::Exposure, &key).await.is_ok());
        Ok(())
    }

    #[test]
    fn test_builder() {
        let store = InMemoryStore::new_arc(Arc::new(Scheme::webapp_operator()));
        let result = Reconciler::builder()
            .with_store(store)
            .resync_interval(Duration::from_secs(10))
            .build();

        assert!(result.is_ok());
        assert_eq!(
            result.ok().map(|r| r.config().resync_interval),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_builder_requires_store() {
        let result = Reconciler::builder().build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
