//! Ingress reconciliation controller
//!
//! Workers pull `namespace/name` keys from the work queue and converge
//! vulcand on the mirrored state of that Ingress:
//!
//! ```text
//! Dequeued -> Looked up -> Present: upsert every route   -> Done
//!                       -> Absent:  delete by ID prefix  -> Done
//! ```
//!
//! Every downstream call is an idempotent upsert or delete by deterministic
//! ID, so a failed pass is retried by replaying the whole resource. A key that
//! keeps failing is retried `max_retries` times with backoff, then reported
//! and dropped until the next change notification re-adds it.

use crate::apis::ingress::ingress::split_key;
use crate::apis::ingress::mirror::ResourceMirror;
use crate::apis::metrics::{record_drop, record_ingress_reconciliation, record_requeue};
use crate::error::ReconcileError;
use crate::proxy::ProxyAdapter;
use crate::queue::WorkQueue;
use common::{desired_routes, RoutingResource};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Default retry budget per key
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Sink for keys dropped after exhausting their retries
pub trait ErrorReporter: Send + Sync {
    fn report(&self, key: &str, error: &ReconcileError);
}

/// Reports dropped keys to the log
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, key: &str, error: &ReconcileError) {
        error!(key = %key, error = %error, "Giving up on ingress after repeated failures");
    }
}

/// Result of one successful reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Upserted { routes: usize, pruned: usize },
    Removed { frontends: usize, backends: usize },
}

impl SyncOutcome {
    fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Upserted { .. } => "upserted",
            SyncOutcome::Removed { .. } => "removed",
        }
    }
}

pub struct IngressController {
    mirror: Arc<dyn ResourceMirror>,
    queue: Arc<WorkQueue<String>>,
    proxy: ProxyAdapter,
    reporter: Arc<dyn ErrorReporter>,
    max_retries: u32,
    prune: bool,
}

impl IngressController {
    pub fn new(
        mirror: Arc<dyn ResourceMirror>,
        queue: Arc<WorkQueue<String>>,
        proxy: ProxyAdapter,
    ) -> Self {
        Self {
            mirror,
            queue,
            proxy,
            reporter: Arc::new(LogErrorReporter),
            max_retries: DEFAULT_MAX_RETRIES,
            prune: false,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delete owned objects that are no longer desired after each upsert
    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn queue(&self) -> &Arc<WorkQueue<String>> {
        &self.queue
    }

    /// Process one key; `false` once the queue has shut down
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let result = self.sync(&key).await;
        self.handle_err(&key, result);
        self.queue.done(&key);
        true
    }

    /// Reconcile the Ingress stored under `key`
    pub async fn sync(&self, key: &str) -> Result<SyncOutcome, ReconcileError> {
        let start = Instant::now();

        let result = match self.mirror.get(key) {
            Some(resource) => self.upsert(&resource).await,
            None => self.remove(key).await,
        };

        let (namespace, name) = split_key(key).unwrap_or(("", key));
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.kind(),
        };
        record_ingress_reconciliation(name, namespace, start.elapsed().as_secs_f64(), label);

        result
    }

    /// Remove everything the (deleted) Ingress owned
    async fn remove(&self, key: &str) -> Result<SyncOutcome, ReconcileError> {
        let (namespace, name) = split_key(key)?;
        info!("Removing ingress: {}/{}", namespace, name);

        let frontends = self.proxy.delete_frontends(namespace, name).await?;
        let backends = self.proxy.delete_backends(namespace, name).await?;

        info!(
            "Removed ingress {}/{}: {} frontends, {} backends",
            namespace, name, frontends, backends
        );
        Ok(SyncOutcome::Removed {
            frontends,
            backends,
        })
    }

    /// Apply every route of the Ingress, stopping at the first error
    async fn upsert(&self, resource: &RoutingResource) -> Result<SyncOutcome, ReconcileError> {
        let namespace = resource.namespace.as_str();
        let name = resource.name.as_str();
        info!("Reconciling ingress: {}/{}", namespace, name);

        let routes = desired_routes(resource);
        let mut pruned = 0;
        for route in &routes {
            self.proxy.sync_backend(&route.backend).await?;
            self.proxy.sync_frontend(&route.frontend).await?;
            self.proxy.sync_server(route.id(), &route.server).await?;
            let applied = self
                .proxy
                .sync_middlewares(&route.frontend.id, &route.middlewares)
                .await?;
            debug!("Synced route {} ({} middlewares)", route.id(), applied);

            if self.prune {
                let declared: HashSet<String> =
                    route.middlewares.iter().map(|mw| mw.id.clone()).collect();
                pruned += self
                    .proxy
                    .prune_middlewares(&route.frontend.id, &declared)
                    .await?;
            }
        }

        if self.prune {
            let desired: HashSet<String> = routes.iter().map(|r| r.id().to_string()).collect();
            pruned += self.proxy.prune(namespace, name, &desired).await?;
        }

        info!(
            "Reconciled ingress {}/{}: {} routes",
            namespace,
            name,
            routes.len()
        );
        Ok(SyncOutcome::Upserted {
            routes: routes.len(),
            pruned,
        })
    }

    /// Retry policy
    fn handle_err(&self, key: &str, result: Result<SyncOutcome, ReconcileError>) {
        let key = key.to_string();

        let error = match result {
            Ok(_) => {
                self.queue.forget(&key);
                return;
            }
            Err(e) => e,
        };

        let requeues = self.queue.num_requeues(&key);
        if requeues < self.max_retries {
            warn!(
                "Error syncing ingress {} (attempt {}): {}",
                key,
                requeues + 1,
                error
            );
            record_requeue(error.kind());
            self.queue.add_rate_limited(key);
            return;
        }

        self.queue.forget(&key);
        self.reporter.report(&key, &error);
        record_drop(error.kind());
        info!("Dropping ingress {} out of the queue: {}", key, error);
    }

    /// Run `workers` workers until `shutdown` resolves, then drain and join them
    pub async fn run<F>(self: Arc<Self>, workers: usize, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let workers = workers.max(1);
        info!("Starting ingress controller with {} workers", workers);

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let controller = Arc::clone(&self);
                tokio::spawn(async move {
                    debug!(worker, "Worker started");
                    while controller.process_next_item().await {}
                    debug!(worker, "Worker stopped");
                })
            })
            .collect();

        shutdown.await;

        info!("Shutting down ingress controller");
        self.queue.shut_down_with_drain().await;
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }
        info!("Ingress controller stopped");
    }
}
