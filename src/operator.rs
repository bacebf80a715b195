//! Process wiring: store, controller and rollout simulator.

use std::future::Future;
use std::sync::Arc;

use futures::future::join;
use tracing::{error, info, warn};

use webapp_core::{Kind, Scheme, Shutdown, ShutdownSignal, WebApp};
use webapp_reconciler::{Controller, Reconciler};
use webapp_store::{InMemoryStore, ObjectStore, RolloutSimulator, StoreExt, TracingStore};

use crate::config::OperatorConfig;
use crate::error::Result;

/// A configured operator, ready to run.
pub struct Operator {
    store: Arc<InMemoryStore>,
    controller: Controller,
    simulator: RolloutSimulator,
}

impl Operator {
    /// Wire an operator over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &OperatorConfig) -> Result<Self> {
        config.validate()?;

        let scheme = Arc::new(Scheme::webapp_operator());
        let store = InMemoryStore::new_arc(Arc::clone(&scheme));
        let traced: Arc<dyn ObjectStore> = Arc::new(TracingStore::new(store.clone()));

        let reconciler = Reconciler::builder()
            .with_store(Arc::clone(&traced))
            .with_scheme(Arc::clone(&scheme))
            .with_config(config.reconciler())
            .build()?;
        let controller = Controller::builder()
            .with_store(Arc::clone(&traced))
            .with_scheme(scheme)
            .with_reconciler(Arc::new(reconciler))
            .for_kind(Kind::WebApp)
            .owns(Kind::Workload)
            .owns(Kind::Exposure)
            .workers(config.workers)
            .backoff(config.backoff())
            .build()?;
        let simulator = RolloutSimulator::new(store.clone(), config.rollout_delay);

        Ok(Self {
            store,
            controller,
            simulator,
        })
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> Arc<InMemoryStore> {
        Arc::clone(&self.store)
    }

    /// Create each declaration; ones that already exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first store error other than `AlreadyExists`.
    pub async fn seed(&self, webapps: Vec<WebApp>) -> Result<usize> {
        let mut created = 0_usize;
        for webapp in webapps {
            let key = webapp.metadata.key();
            match self.store.create_as(webapp).await {
                Ok(_) => {
                    info!(webapp = %key, "Seeded WebApp");
                    created = created.saturating_add(1);
                }
                Err(e) if e.is_already_exists() => warn!(webapp = %key, "WebApp already exists"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(created)
    }

    /// Run the controller and the simulator until `shutdown` fires.
    ///
    /// If either task fails, the other is stopped too.
    ///
    /// # Errors
    ///
    /// Returns the controller's error first, then the simulator's.
    pub async fn run(self, shutdown: Shutdown) -> Result<()> {
        let Self {
            controller,
            simulator,
            ..
        } = self;
        info!(workers = controller.workers(), "Starting operator");

        let controller_shutdown = shutdown.clone();
        let controller = async move {
            let result = controller.run(controller_shutdown.clone()).await;
            if let Err(e) = &result {
                error!(error = %e, "Controller failed");
                controller_shutdown.trigger(ShutdownSignal::Programmatic);
            }
            result
        };
        let simulator = async move {
            let result = simulator.run(shutdown.clone()).await;
            if let Err(e) = &result {
                error!(error = %e, "Rollout simulator failed");
                shutdown.trigger(ShutdownSignal::Programmatic);
            }
            result
        };

        let (controller, simulator) = join(controller, simulator).await;
        controller?;
        simulator?;
        info!("Operator stopped");
        Ok(())
    }
}

/// Trigger `shutdown` with SIGINT once `signal` resolves.
///
/// If the signal handler cannot be installed the error is logged and this
/// never returns, so the operator keeps running instead of stopping at once.
pub async fn shutdown_on_signal<F>(signal: F, shutdown: Shutdown)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown.trigger(ShutdownSignal::Sigint);
        }
        Err(err) => {
            error!(error = %err, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
