//! Controller wiring watches, the work queue and reconciler workers.
//!
//! The primary kind is watched directly: every event enqueues the object's
//! own identity. Owned kinds are watched indirectly: an event enqueues the
//! identity of the primary object named by the controller owner reference,
//! and is dropped when there is none. Both paths feed one coalescing queue.

use std::sync::Arc;

use futures::future::join_all;
use itertools::Itertools;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use webapp_core::{Error as StoreError, Gvk, Kind, Object, ObjectKey, Scheme, Shutdown};
use webapp_store::{ObjectStore, WatchStream};

use crate::backoff::ExponentialBackoff;
use crate::error::{Error, Result};
use crate::ownership::owner_key_for;
use crate::queue::WorkQueue;
use crate::reconciler::Reconcile;
use crate::types::Requeue;

/// Default number of concurrent reconciler workers.
pub const DEFAULT_WORKERS: usize = 2;

/// How events of a watched kind are turned into queue keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMapping {
    /// The object is itself the primary.
    Direct,
    /// The object is owned; map it to its controller owner of this kind.
    Owner(Gvk),
}

impl EventMapping {
    /// Queue key for an object, if it belongs to a primary.
    #[must_use]
    pub fn key_for(&self, object: &Object) -> Option<ObjectKey> {
        match self {
            Self::Direct => Some(object.key()),
            Self::Owner(gvk) => owner_key_for(object.meta(), gvk),
        }
    }
}

/// A kind to watch and how to map its events.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Source {
    kind: Kind,
    mapping: EventMapping,
}

/// Watch-driven reconciliation controller.
pub struct Controller {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<dyn Reconcile>,
    sources: Vec<Source>,
    workers: usize,
    backoff: ExponentialBackoff,
    queue: Arc<WorkQueue<ObjectKey>>,
}

impl Controller {
    /// Start building a controller.
    #[must_use]
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// The work queue shared by sources and workers.
    #[must_use]
    pub const fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// Number of workers started by [`Controller::run`].
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Run until `shutdown` is triggered.
    ///
    /// Opens every watch, enqueues all existing primaries, then starts the
    /// workers. A failing initial list is retried with backoff until it
    /// succeeds or shutdown fires. On shutdown the queue stops handing out
    /// keys; in-flight passes observe the same signal and abort at their
    /// next store call.
    ///
    /// # Errors
    ///
    /// Currently infallible; store failures are retried, never returned.
    pub async fn run(self, shutdown: Shutdown) -> Result<()> {
        let streams = self
            .sources
            .iter()
            .map(|source| (source.clone(), self.store.watch(source.kind)))
            .collect_vec();

        for source in &self.sources {
            if !relist(self.store.as_ref(), &self.queue, source, &self.backoff, &shutdown).await {
                info!("Controller stopped before startup completed");
                return Ok(());
            }
        }

        info!(
            workers = self.workers,
            watches = streams.len(),
            queued = self.queue.len(),
            "Controller started"
        );

        let sources: Vec<JoinHandle<()>> = streams
            .into_iter()
            .map(|(source, stream)| {
                tokio::spawn(run_source(
                    Arc::clone(&self.store),
                    Arc::clone(&self.queue),
                    source,
                    stream,
                    self.backoff,
                    shutdown.clone(),
                ))
            })
            .collect();

        let workers: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&self.reconciler),
                    Arc::clone(&self.queue),
                    shutdown.clone(),
                ))
            })
            .collect();

        shutdown.cancelled().await;
        info!("Controller stopping");
        self.queue.shutdown();

        for result in join_all(workers.into_iter().chain(sources)).await {
            if let Err(e) = result {
                error!(error = %e, "Controller task failed");
            }
        }

        info!("Controller stopped");
        Ok(())
    }
}

/// List a watched kind and enqueue the key of every object that maps to one.
async fn enqueue_all(store: &dyn ObjectStore, queue: &WorkQueue<ObjectKey>, source: &Source) -> Result<()> {
    let objects = store.list(source.kind).await?;
    objects
        .iter()
        .filter_map(|object| source.mapping.key_for(object))
        .unique()
        .for_each(|key| queue.add(key));
    Ok(())
}

/// Retry [`enqueue_all`] with backoff until it succeeds.
///
/// Returns `false` if shutdown fired first.
async fn relist(
    store: &dyn ObjectStore,
    queue: &WorkQueue<ObjectKey>,
    source: &Source,
    backoff: &ExponentialBackoff,
    shutdown: &Shutdown,
) -> bool {
    let mut failures = 0_u32;
    loop {
        if shutdown.is_triggered() {
            return false;
        }
        match enqueue_all(store, queue, source).await {
            Ok(()) => return true,
            Err(e) => {
                let delay = backoff.delay_for(failures);
                failures = failures.saturating_add(1);
                warn!(
                    kind = %source.kind,
                    error = %e,
                    failures,
                    ?delay,
                    "List failed, retrying"
                );
                tokio::select! {
                    () = shutdown.cancelled() => return false,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn run_source(
    store: Arc<dyn ObjectStore>,
    queue: Arc<WorkQueue<ObjectKey>>,
    source: Source,
    mut stream: WatchStream,
    backoff: ExponentialBackoff,
    shutdown: Shutdown,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = stream.recv() => event,
        };

        match event {
            Ok(event) => match source.mapping.key_for(&event.object) {
                Some(key) => {
                    debug!(
                        kind = %source.kind,
                        object = %event.object.key(),
                        webapp = %key,
                        change = ?event.change,
                        "Enqueueing from watch"
                    );
                    queue.add(key);
                }
                None => {
                    debug!(
                        kind = %source.kind,
                        object = %event.object.key(),
                        "Ignoring event without a controlling WebApp"
                    );
                }
            },
            Err(StoreError::WatchLagged { missed }) => {
                warn!(kind = %source.kind, missed, "Watch lagged, relisting");
                if !relist(store.as_ref(), &queue, &source, &backoff, &shutdown).await {
                    break;
                }
            }
            Err(e) => {
                error!(kind = %source.kind, error = %e, "Watch ended");
                break;
            }
        }
    }
    debug!(kind = %source.kind, "Watch source stopped");
}

async fn run_worker(
    id: usize,
    reconciler: Arc<dyn Reconcile>,
    queue: Arc<WorkQueue<ObjectKey>>,
    shutdown: Shutdown,
) {
    debug!(worker = id, "Worker started");
    while let Some(key) = queue.get().await {
        let result = reconciler.reconcile(&key, &shutdown).await;
        handle_result(&queue, &key, result);
        queue.done(&key);
    }
    debug!(worker = id, "Worker stopped");
}

/// Apply the outcome of a pass to the queue.
fn handle_result(queue: &Arc<WorkQueue<ObjectKey>>, key: &ObjectKey, result: Result<Requeue>) {
    match result {
        Ok(requeue) => {
            queue.forget(key);
            match requeue {
                Requeue::Done => {}
                Requeue::Immediately => queue.add(key.clone()),
                Requeue::After(delay) => queue.add_after(key.clone(), delay),
            }
        }
        Err(e) if e.is_cancelled() => {
            debug!(webapp = %key, "Reconciliation cancelled");
        }
        Err(e) if e.is_conflict() => {
            debug!(webapp = %key, error = %e, "Reconciliation lost a write race, retrying");
            queue.add_rate_limited(key.clone());
        }
        Err(e) => {
            warn!(
                webapp = %key,
                error = %e,
                failures = queue.num_requeues(key),
                "Reconciliation failed, retrying with backoff"
            );
            queue.add_rate_limited(key.clone());
        }
    }
}

/// Builder for Controller.
pub struct ControllerBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    scheme: Option<Arc<Scheme>>,
    reconciler: Option<Arc<dyn Reconcile>>,
    primary: Option<Kind>,
    owned: Vec<Kind>,
    workers: usize,
    backoff: ExponentialBackoff,
}

impl ControllerBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            scheme: None,
            reconciler: None,
            primary: None,
            owned: Vec::new(),
            workers: DEFAULT_WORKERS,
            backoff: ExponentialBackoff::default(),
        }
    }

    /// Set the store to watch.
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

    /// Set the reconciler run by the workers.
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconcile>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Watch the primary kind directly.
    #[must_use]
    pub const fn for_kind(mut self, kind: Kind) -> Self {
        self.primary = Some(kind);
        self
    }

    /// Watch a kind owned by the primary.
    #[must_use]
    pub fn owns(mut self, kind: Kind) -> Self {
        if !self.owned.contains(&kind) {
            self.owned.push(kind);
        }
        self
    }

    /// Set the number of workers.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the failure backoff curve.
    #[must_use]
    pub const fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the store, reconciler or primary
    /// kind is missing or no worker would run, and a store error if a
    /// watched kind is not registered in the scheme.
    pub fn build(self) -> Result<Controller> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("store is required"))?;
        let reconciler = self
            .reconciler
            .ok_or_else(|| Error::invalid_config("reconciler is required"))?;
        let primary = self
            .primary
            .ok_or_else(|| Error::invalid_config("primary kind is required"))?;
        if self.workers == 0 {
            return Err(Error::invalid_config("at least one worker is required"));
        }
        if self.owned.contains(&primary) {
            return Err(Error::invalid_config(format!(
                "{primary} cannot own itself"
            )));
        }

        let scheme = self
            .scheme
            .unwrap_or_else(|| Arc::new(Scheme::webapp_operator()));
        let owner_gvk = scheme.gvk(primary)?.clone();

        let sources = std::iter::once(Ok(Source {
            kind: primary,
            mapping: EventMapping::Direct,
        }))
        .chain(self.owned.into_iter().map(|kind| {
            scheme.gvk(kind).map(|_| Source {
                kind,
                mapping: EventMapping::Owner(owner_gvk.clone()),
            })
        }))
        .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Controller {
            store,
            reconciler,
            sources,
            workers: self.workers,
            backoff: self.backoff,
            queue: WorkQueue::new_arc(self.backoff),
        })
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;
    use webapp_core::{ShutdownSignal, WebApp, WebAppSpec};
    use webapp_store::{FaultyStore, InMemoryStore, Operation, StoreExt, WatchBus};

    use super::*;
    use crate::synthesize::workload_for;

    /// Records every key it is asked to reconcile.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ObjectKey>>,
        requeue: Option<Requeue>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<ObjectKey> {
            self.seen.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Reconcile for Recorder {
        async fn reconcile(&self, key: &ObjectKey, _shutdown: &Shutdown) -> Result<Requeue> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(key.clone());
            }
            // Stand-in for store I/O so a requeue loop cannot starve the test task.
            tokio::task::yield_now().await;
            Ok(self.requeue.unwrap_or(Requeue::Done))
        }
    }

    /// Plays back scripted outcomes, then succeeds with `Done`.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<Requeue>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<Requeue>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn gaps(&self) -> Vec<Duration> {
            self.calls()
                .iter()
                .tuple_windows()
                .map(|(a, b)| b.duration_since(*a))
                .collect()
        }
    }

    #[async_trait]
    impl Reconcile for Scripted {
        async fn reconcile(&self, _key: &ObjectKey, _shutdown: &Shutdown) -> Result<Requeue> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(Instant::now());
            }
            tokio::task::yield_now().await;
            self.outcomes
                .lock()
                .ok()
                .and_then(|mut outcomes| outcomes.pop_front())
                .unwrap_or(Ok(Requeue::Done))
        }
    }

    fn unavailable() -> StoreError {
        StoreError::unavailable("list", "store unreachable")
    }

    fn store() -> Arc<InMemoryStore> {
        InMemoryStore::new_arc(Arc::new(Scheme::webapp_operator()))
    }

    fn controller(store: Arc<dyn ObjectStore>, reconciler: Arc<dyn Reconcile>) -> Controller {
        Controller::builder()
            .with_store(store)
            .with_reconciler(reconciler)
            .for_kind(Kind::WebApp)
            .owns(Kind::Workload)
            .owns(Kind::Exposure)
            .workers(1)
            .build()
            .expect("valid controller")
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        wait_for(Duration::from_secs(2), condition).await;
    }

    async fn wait_for<F: Fn() -> bool>(limit: Duration, condition: F) {
        tokio::time::timeout(limit, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_event_mapping() {
        let scheme = Scheme::webapp_operator();
        let mut webapp = WebApp::new("default", "nginx-app", WebAppSpec::new("nginx", 1));
        webapp.metadata.uid = "uid-1".to_string();
        let workload = workload_for(&webapp, &scheme).expect("synthesized");

        let owner = EventMapping::Owner(scheme.gvk(Kind::WebApp).expect("registered").clone());
        let expected = Some(ObjectKey::new("default", "nginx-app"));
        assert_eq!(owner.key_for(&Object::from(workload.clone())), expected);
        assert_eq!(EventMapping::Direct.key_for(&Object::from(webapp)), expected);

        let mut orphan = workload;
        orphan.metadata.owner_references.clear();
        assert_eq!(owner.key_for(&Object::from(orphan)), None);
    }

    #[test]
    fn test_builder_validation() {
        let recorder: Arc<dyn Reconcile> = Arc::new(Recorder::default());
        let missing_primary = Controller::builder()
            .with_store(store())
            .with_reconciler(Arc::clone(&recorder))
            .build();
        assert!(matches!(missing_primary, Err(Error::InvalidConfig { .. })));

        let no_workers = Controller::builder()
            .with_store(store())
            .with_reconciler(Arc::clone(&recorder))
            .for_kind(Kind::WebApp)
            .workers(0)
            .build();
        assert!(matches!(no_workers, Err(Error::InvalidConfig { .. })));

        let unregistered = Controller::builder()
            .with_store(store())
            .with_scheme(Arc::new(Scheme::builder().build()))
            .with_reconciler(recorder)
            .for_kind(Kind::WebApp)
            .build();
        assert!(matches!(unregistered, Err(Error::Store(StoreError::UnregisteredKind { .. }))));
    }

    #[tokio::test]
    async fn test_startup_enqueues_existing_and_watches_changes() {
        let store = store();
        let existing = store
            .create_as(WebApp::new("default", "existing", WebAppSpec::new("nginx", 1)))
            .await
            .expect("create");

        let recorder = Arc::new(Recorder::default());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller(store.clone(), recorder.clone()).run(shutdown.clone()));

        let existing_key = existing.metadata.key();
        wait_until(|| recorder.seen().contains(&existing_key)).await;

        let created = store
            .create_as(WebApp::new("default", "fresh", WebAppSpec::new("nginx", 1)))
            .await
            .expect("create");
        let fresh_key = created.metadata.key();
        wait_until(|| recorder.seen().contains(&fresh_key)).await;

        shutdown.trigger(ShutdownSignal::Programmatic);
        let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(joined, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_owned_events_enqueue_owner() {
        let store = store();
        let webapp = store
            .create_as(WebApp::new("default", "nginx-app", WebAppSpec::new("nginx", 1)))
            .await
            .expect("create");

        let recorder = Arc::new(Recorder::default());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller(store.clone(), recorder.clone()).run(shutdown.clone()));
        wait_until(|| recorder.seen().len() == 1).await;

        let workload = workload_for(&webapp, &Scheme::webapp_operator()).expect("synthesized");
        store.create_as(workload).await.expect("create workload");
        wait_until(|| recorder.seen().len() == 2).await;
        assert!(recorder.seen().iter().all(|k| *k == webapp.metadata.key()));

        shutdown.trigger(ShutdownSignal::Programmatic);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_immediate_requeue_runs_again() {
        let store = store();
        store
            .create_as(WebApp::new("default", "nginx-app", WebAppSpec::new("nginx", 1)))
            .await
            .expect("create");

        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            requeue: Some(Requeue::Immediately),
        });
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller(store, recorder.clone()).run(shutdown.clone()));

        wait_until(|| recorder.seen().len() >= 3).await;
        shutdown.trigger(ShutdownSignal::Programmatic);
        let _ = handle.await;
    }

    async fn declare(store: &InMemoryStore, name: &str) -> ObjectKey {
        store
            .create_as(WebApp::new("default", name, WebAppSpec::new("nginx", 1)))
            .await
            .expect("create")
            .metadata
            .key()
    }

    async fn stop(shutdown: &Shutdown, handle: JoinHandle<Result<()>>) {
        shutdown.trigger(ShutdownSignal::Programmatic);
        let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(joined, Ok(Ok(Ok(())))));
    }

    fn close_to(actual: Duration, expected: Duration) -> bool {
        actual >= expected && actual < expected.saturating_add(Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_then_success_resets() {
        let store = store();
        let key = declare(&store, "nginx-app").await;

        let scripted = Arc::new(Scripted::new(vec![
            Err(Error::Store(unavailable())),
            Err(Error::Store(unavailable())),
        ]));
        let controller = controller(store, scripted.clone());
        let queue = Arc::clone(controller.queue());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));

        wait_for(Duration::from_secs(10), || {
            scripted.calls().len() == 3 && queue.num_requeues(&key) == 0
        })
        .await;

        let gaps = scripted.gaps();
        assert_eq!(gaps.len(), 2);
        assert!(gaps.first().is_some_and(|g| close_to(*g, Duration::from_secs(1))), "{gaps:?}");
        assert!(gaps.get(1).is_some_and(|g| close_to(*g, Duration::from_secs(2))), "{gaps:?}");
        assert!(!queue.is_waiting(&key));

        stop(&shutdown, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_is_retried_with_backoff() {
        let store = store();
        let key = declare(&store, "nginx-app").await;

        let conflict = StoreError::conflict(Kind::WebApp, &key, 1, 2);
        let scripted = Arc::new(Scripted::new(vec![Err(Error::Store(conflict))]));
        let controller = controller(store, scripted.clone());
        let queue = Arc::clone(controller.queue());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));

        wait_for(Duration::from_secs(10), || {
            scripted.calls().len() == 2 && queue.num_requeues(&key) == 0
        })
        .await;
        let gaps = scripted.gaps();
        assert!(gaps.first().is_some_and(|g| close_to(*g, Duration::from_secs(1))), "{gaps:?}");

        stop(&shutdown, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pass_is_not_requeued() {
        let store = store();
        let key = declare(&store, "nginx-app").await;

        let scripted = Arc::new(Scripted::new(vec![Err(Error::Stopped)]));
        let controller = controller(store, scripted.clone());
        let queue = Arc::clone(controller.queue());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));

        wait_until(|| scripted.calls().len() == 1).await;
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(scripted.calls().len(), 1);
        assert!(!queue.is_waiting(&key));
        assert_eq!(queue.num_requeues(&key), 0);

        stop(&shutdown, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_list_failure_is_retried() {
        let inner = store();
        let key = declare(&inner, "nginx-app").await;

        let faulty = Arc::new(FaultyStore::new(inner));
        faulty.fail_next(Operation::List, unavailable()).await;
        faulty.fail_next(Operation::List, unavailable()).await;

        let recorder = Arc::new(Recorder::default());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller(faulty, recorder.clone()).run(shutdown.clone()));

        wait_for(Duration::from_secs(10), || recorder.seen().contains(&key)).await;
        stop(&shutdown, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_startup_list_retry() {
        let faulty = Arc::new(FaultyStore::new(store()));
        for _ in 0..5 {
            faulty.fail_next(Operation::List, unavailable()).await;
        }

        let shutdown = Shutdown::new();
        let recorder = Arc::new(Recorder::default());
        let handle = tokio::spawn(controller(faulty, recorder.clone()).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        stop(&shutdown, handle).await;
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_relist_after_lag_is_retried() {
        let inner = Arc::new(InMemoryStore::with_bus(
            Arc::new(Scheme::webapp_operator()),
            WatchBus::new(1),
        ));
        let faulty = Arc::new(FaultyStore::new(inner.clone()));
        let recorder = Arc::new(Recorder::default());
        let controller = Controller::builder()
            .with_store(faulty.clone())
            .with_reconciler(recorder.clone())
            .for_kind(Kind::WebApp)
            .workers(1)
            .build()
            .expect("valid controller");
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The store stays unlistable while a burst overflows the watch.
        for _ in 0..3 {
            faulty.fail_next(Operation::List, unavailable()).await;
        }
        let mut declared = HashSet::new();
        for i in 0..20 {
            declared.insert(declare(&inner, &format!("app-{i}")).await);
        }

        wait_for(Duration::from_secs(30), || {
            recorder.seen().into_iter().collect::<HashSet<_>>() == declared
        })
        .await;

        stop(&shutdown, handle).await;
    }
}
