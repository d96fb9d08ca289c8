//! Shared test doubles
//!
//! `FakeProxy` keeps vulcand's object model in memory and enforces the same
//! referential rules (a frontend needs its backend, a backend with servers or
//! frontends cannot be deleted). Failures and latency can be injected per
//! operation.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use common::{
    BackendReference, DownstreamBackend, DownstreamFrontend, DownstreamMiddleware,
    DownstreamServer, IngressRule, RoutingResource,
};
use control::apis::ingress::mirror::StaticMirror;
use control::controller::{ErrorReporter, IngressController};
use control::error::{ProxyError, ReconcileError};
use control::proxy::{MiddlewareRegistry, ProxyAdapter, ProxyApi};
use control::queue::{ItemExponentialBackoff, WorkQueue};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    backends: BTreeMap<String, DownstreamBackend>,
    frontends: BTreeMap<String, DownstreamFrontend>,
    /// backend id -> server id -> server
    servers: BTreeMap<String, BTreeMap<String, DownstreamServer>>,
    /// frontend id -> middleware id -> middleware
    middlewares: BTreeMap<String, BTreeMap<String, DownstreamMiddleware>>,
    /// "operation target" per call, in order
    calls: Vec<String>,
    /// operation -> remaining injected failures
    failures: HashMap<String, usize>,
    delay: Option<Duration>,
}

/// In-memory vulcand
#[derive(Default)]
pub struct FakeProxy {
    state: Mutex<FakeState>,
}

fn status(operation: &str, status: u16, body: &str) -> ProxyError {
    ProxyError::Status {
        operation: operation.to_string(),
        status,
        body: body.to_string(),
    }
}

impl FakeProxy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `times` calls of `operation` (e.g. "upsert_server")
    pub fn fail_next(&self, operation: &str, times: usize) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation.to_string(), times);
    }

    /// Delay every call by `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Number of calls whose operation is `operation`
    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().backends.keys().cloned().collect()
    }

    pub fn frontend_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().frontends.keys().cloned().collect()
    }

    pub fn frontend(&self, id: &str) -> Option<DownstreamFrontend> {
        self.state.lock().unwrap().frontends.get(id).cloned()
    }

    pub fn servers(&self, backend_id: &str) -> Vec<DownstreamServer> {
        self.state
            .lock()
            .unwrap()
            .servers
            .get(backend_id)
            .map(|servers| servers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn middlewares(&self, frontend_id: &str) -> Vec<DownstreamMiddleware> {
        self.state
            .lock()
            .unwrap()
            .middlewares
            .get(frontend_id)
            .map(|middlewares| middlewares.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every stored object ID, tagged by kind
    pub fn snapshot(&self) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        let mut objects = BTreeSet::new();
        objects.extend(state.backends.keys().map(|id| format!("backend {}", id)));
        objects.extend(state.frontends.keys().map(|id| format!("frontend {}", id)));
        for (backend, servers) in &state.servers {
            objects.extend(
                servers
                    .values()
                    .map(|s| format!("server {}/{} {}", backend, s.id, s.url)),
            );
        }
        for (frontend, middlewares) in &state.middlewares {
            objects.extend(
                middlewares
                    .keys()
                    .map(|id| format!("middleware {}/{}", frontend, id)),
            );
        }
        objects
    }

    /// Seed a complete backend + frontend + server set for `id` without recording calls
    pub fn seed(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.backends.insert(
            id.to_string(),
            DownstreamBackend {
                id: id.to_string(),
                kind: "http".to_string(),
                ..Default::default()
            },
        );
        state.frontends.insert(
            id.to_string(),
            DownstreamFrontend {
                id: id.to_string(),
                backend_id: id.to_string(),
                kind: "http".to_string(),
                ..Default::default()
            },
        );
        state.servers.entry(id.to_string()).or_default().insert(
            id.to_string(),
            DownstreamServer {
                id: id.to_string(),
                url: "http://seeded:80".to_string(),
            },
        );
    }

    /// Record the call, then apply injected latency and failures
    async fn enter(&self, operation: &str, target: &str) -> Result<(), ProxyError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("{} {}", operation, target));
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProxyError::Transport {
                    operation: operation.to_string(),
                    message: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProxyApi for FakeProxy {
    async fn upsert_backend(&self, backend: &DownstreamBackend) -> Result<(), ProxyError> {
        self.enter("upsert_backend", &backend.id).await?;
        let mut state = self.state.lock().unwrap();
        state.backends.insert(backend.id.clone(), backend.clone());
        Ok(())
    }

    async fn upsert_frontend(&self, frontend: &DownstreamFrontend) -> Result<(), ProxyError> {
        self.enter("upsert_frontend", &frontend.id).await?;
        let mut state = self.state.lock().unwrap();
        if !state.backends.contains_key(&frontend.backend_id) {
            return Err(status("upsert_frontend", 404, "backend not found"));
        }
        state.frontends.insert(frontend.id.clone(), frontend.clone());
        Ok(())
    }

    async fn upsert_server(
        &self,
        backend_id: &str,
        server: &DownstreamServer,
    ) -> Result<(), ProxyError> {
        self.enter("upsert_server", &server.id).await?;
        let mut state = self.state.lock().unwrap();
        if !state.backends.contains_key(backend_id) {
            return Err(status("upsert_server", 404, "backend not found"));
        }
        state
            .servers
            .entry(backend_id.to_string())
            .or_default()
            .insert(server.id.clone(), server.clone());
        Ok(())
    }

    async fn upsert_middleware(
        &self,
        frontend_id: &str,
        middleware: &DownstreamMiddleware,
    ) -> Result<(), ProxyError> {
        self.enter("upsert_middleware", &middleware.id).await?;
        let mut state = self.state.lock().unwrap();
        if !state.frontends.contains_key(frontend_id) {
            return Err(status("upsert_middleware", 404, "frontend not found"));
        }
        state
            .middlewares
            .entry(frontend_id.to_string())
            .or_default()
            .insert(middleware.id.clone(), middleware.clone());
        Ok(())
    }

    async fn list_backends(&self) -> Result<Vec<DownstreamBackend>, ProxyError> {
        self.enter("list_backends", "*").await?;
        Ok(self.state.lock().unwrap().backends.values().cloned().collect())
    }

    async fn list_frontends(&self) -> Result<Vec<DownstreamFrontend>, ProxyError> {
        self.enter("list_frontends", "*").await?;
        Ok(self.state.lock().unwrap().frontends.values().cloned().collect())
    }

    async fn list_servers(&self, backend_id: &str) -> Result<Vec<DownstreamServer>, ProxyError> {
        self.enter("list_servers", backend_id).await?;
        Ok(self.servers(backend_id))
    }

    async fn list_middlewares(
        &self,
        frontend_id: &str,
    ) -> Result<Vec<DownstreamMiddleware>, ProxyError> {
        self.enter("list_middlewares", frontend_id).await?;
        Ok(self.middlewares(frontend_id))
    }

    async fn delete_backend(&self, id: &str) -> Result<(), ProxyError> {
        self.enter("delete_backend", id).await?;
        let mut state = self.state.lock().unwrap();
        if state.servers.get(id).is_some_and(|servers| !servers.is_empty()) {
            return Err(status("delete_backend", 409, "backend has servers"));
        }
        if state.frontends.values().any(|f| f.backend_id == id) {
            return Err(status("delete_backend", 409, "backend is used by a frontend"));
        }
        state.backends.remove(id);
        state.servers.remove(id);
        Ok(())
    }

    async fn delete_frontend(&self, id: &str) -> Result<(), ProxyError> {
        self.enter("delete_frontend", id).await?;
        let mut state = self.state.lock().unwrap();
        state.frontends.remove(id);
        state.middlewares.remove(id);
        Ok(())
    }

    async fn delete_server(&self, backend_id: &str, id: &str) -> Result<(), ProxyError> {
        self.enter("delete_server", id).await?;
        let mut state = self.state.lock().unwrap();
        if let Some(servers) = state.servers.get_mut(backend_id) {
            servers.remove(id);
        }
        Ok(())
    }

    async fn delete_middleware(&self, frontend_id: &str, id: &str) -> Result<(), ProxyError> {
        self.enter("delete_middleware", id).await?;
        let mut state = self.state.lock().unwrap();
        if let Some(middlewares) = state.middlewares.get_mut(frontend_id) {
            middlewares.remove(id);
        }
        Ok(())
    }
}

/// Error reporter that remembers what it was given
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(key, error message)` pairs in report order
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, key: &str, error: &ReconcileError) {
        self.reports
            .lock()
            .unwrap()
            .push((key.to_string(), error.to_string()));
    }
}

/// Everything a reconciler test needs
pub struct Harness {
    pub mirror: Arc<StaticMirror>,
    pub proxy: Arc<FakeProxy>,
    pub reporter: Arc<RecordingReporter>,
    pub queue: Arc<WorkQueue<String>>,
    pub controller: IngressController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(Duration::from_secs(10), false)
    }

    pub fn with_options(call_timeout: Duration, prune: bool) -> Self {
        let mirror = Arc::new(StaticMirror::new());
        let proxy = FakeProxy::new();
        let reporter = RecordingReporter::new();
        let queue: Arc<WorkQueue<String>> = WorkQueue::new(
            "test",
            Box::new(ItemExponentialBackoff::new(
                Duration::from_millis(5),
                Duration::from_secs(1000),
            )),
        );

        let adapter = ProxyAdapter::new(
            proxy.clone(),
            Arc::new(MiddlewareRegistry::with_defaults()),
            call_timeout,
        );
        let controller = IngressController::new(mirror.clone(), Arc::clone(&queue), adapter)
            .with_reporter(reporter.clone())
            .with_pruning(prune);

        Self {
            mirror,
            proxy,
            reporter,
            queue,
            controller,
        }
    }

    /// Store `resource` in the mirror and enqueue its key
    pub fn apply(&self, resource: RoutingResource) -> String {
        let key = self.mirror.insert(resource);
        self.queue.add(key.clone());
        key
    }

    /// Remove `key` from the mirror and enqueue it
    pub fn delete(&self, key: &str) {
        self.mirror.remove(key);
        self.queue.add(key.to_string());
    }
}

/// `shop/web`: default backend `www:80` plus `shop.example.com/api -> api:8080`
pub fn shop_web() -> RoutingResource {
    RoutingResource::new("shop", "web")
        .with_default_backend(BackendReference::new("www", 80))
        .with_rule(
            IngressRule::new("shop.example.com")
                .with_path("/api", BackendReference::new("api", 8080)),
        )
}
