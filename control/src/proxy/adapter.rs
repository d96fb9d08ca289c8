//! Proxy Adapter
//!
//! Sits between the reconciler and a `ProxyApi`:
//! - bounds every remote call by `call_timeout` (`ProxyError::Timeout`)
//! - resolves middleware declarations against the `MiddlewareRegistry`
//! - deletes everything owned by an Ingress by ID prefix
//! - prunes objects an Ingress no longer declares
//!
//! Calls are recorded in `vulcan_api_calls_total`.

use super::api::ProxyApi;
use super::registry::MiddlewareRegistry;
use crate::apis::metrics::record_vulcan_call;
use crate::error::ProxyError;
use common::downstream::DEFAULT_MIDDLEWARE_PRIORITY;
use common::{
    owns_id, DownstreamBackend, DownstreamFrontend, DownstreamMiddleware, DownstreamServer,
    MiddlewareDecl,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct ProxyAdapter {
    api: Arc<dyn ProxyApi>,
    registry: Arc<MiddlewareRegistry>,
    call_timeout: Duration,
}

impl ProxyAdapter {
    pub fn new(
        api: Arc<dyn ProxyApi>,
        registry: Arc<MiddlewareRegistry>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            api,
            registry,
            call_timeout,
        }
    }

    /// Run one remote call under the call timeout
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ProxyError>
    where
        F: Future<Output = Result<T, ProxyError>>,
    {
        let result = match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ProxyError::Timeout {
                operation: operation.to_string(),
                after: self.call_timeout,
            }),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(ProxyError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        record_vulcan_call(operation, outcome);
        result
    }

    pub async fn sync_backend(&self, backend: &DownstreamBackend) -> Result<(), ProxyError> {
        debug!("Syncing backend {}", backend.id);
        self.call("upsert_backend", self.api.upsert_backend(backend)).await
    }

    pub async fn sync_frontend(&self, frontend: &DownstreamFrontend) -> Result<(), ProxyError> {
        debug!("Syncing frontend {} route {:?}", frontend.id, frontend.route);
        self.call("upsert_frontend", self.api.upsert_frontend(frontend)).await
    }

    pub async fn sync_server(
        &self,
        backend_id: &str,
        server: &DownstreamServer,
    ) -> Result<(), ProxyError> {
        debug!("Syncing server {} -> {}", server.id, server.url);
        self.call("upsert_server", self.api.upsert_server(backend_id, server)).await
    }

    /// Upsert the declared middlewares of a frontend, returning how many were applied
    ///
    /// Types the registry does not know are skipped. Settings that fail to
    /// parse for a known type are an error.
    pub async fn sync_middlewares(
        &self,
        frontend_id: &str,
        declarations: &[MiddlewareDecl],
    ) -> Result<usize, ProxyError> {
        let mut applied = 0;

        for decl in declarations {
            let Some(parsed) = self.registry.parse(&decl.kind, &decl.raw) else {
                debug!(
                    "Unknown middleware type {:?} on frontend {}, skipping",
                    decl.kind, frontend_id
                );
                continue;
            };
            let settings = parsed.map_err(|source| ProxyError::InvalidMiddleware {
                kind: decl.kind.clone(),
                source,
            })?;

            let middleware = DownstreamMiddleware {
                id: decl.id.clone(),
                priority: DEFAULT_MIDDLEWARE_PRIORITY,
                kind: decl.kind.clone(),
                middleware: settings,
            };
            debug!("Syncing middleware {} on frontend {}", middleware.id, frontend_id);
            self.call("upsert_middleware", self.api.upsert_middleware(frontend_id, &middleware))
                .await?;
            applied += 1;
        }

        Ok(applied)
    }

    /// Delete every frontend owned by `namespace/name`
    pub async fn delete_frontends(&self, namespace: &str, name: &str) -> Result<usize, ProxyError> {
        let frontends = self.call("list_frontends", self.api.list_frontends()).await?;

        let mut deleted = 0;
        for frontend in frontends
            .iter()
            .filter(|frontend| owns_id(namespace, name, &frontend.id))
        {
            self.delete_frontend(&frontend.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Delete every backend owned by `namespace/name`, servers first
    pub async fn delete_backends(&self, namespace: &str, name: &str) -> Result<usize, ProxyError> {
        let backends = self.call("list_backends", self.api.list_backends()).await?;

        let mut deleted = 0;
        for backend in backends
            .iter()
            .filter(|backend| owns_id(namespace, name, &backend.id))
        {
            self.delete_backend(&backend.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Delete owned frontends and backends whose IDs are not in `desired`
    pub async fn prune(
        &self,
        namespace: &str,
        name: &str,
        desired: &HashSet<String>,
    ) -> Result<usize, ProxyError> {
        let stale = |id: &str| owns_id(namespace, name, id) && !desired.contains(id);
        let mut pruned = 0;

        let frontends = self.call("list_frontends", self.api.list_frontends()).await?;
        for frontend in frontends.iter().filter(|frontend| stale(&frontend.id)) {
            info!("Pruning stale frontend {}", frontend.id);
            self.delete_frontend(&frontend.id).await?;
            pruned += 1;
        }

        let backends = self.call("list_backends", self.api.list_backends()).await?;
        for backend in backends.iter().filter(|backend| stale(&backend.id)) {
            info!("Pruning stale backend {}", backend.id);
            self.delete_backend(&backend.id).await?;
            pruned += 1;
        }

        Ok(pruned)
    }

    /// Delete middlewares of `frontend_id` whose IDs are not in `declared`
    pub async fn prune_middlewares(
        &self,
        frontend_id: &str,
        declared: &HashSet<String>,
    ) -> Result<usize, ProxyError> {
        let middlewares = self
            .call("list_middlewares", self.api.list_middlewares(frontend_id))
            .await?;

        let mut pruned = 0;
        for middleware in middlewares.iter().filter(|mw| !declared.contains(&mw.id)) {
            info!(
                "Pruning stale middleware {} of frontend {}",
                middleware.id, frontend_id
            );
            self.call("delete_middleware", self.api.delete_middleware(frontend_id, &middleware.id))
                .await?;
            pruned += 1;
        }
        Ok(pruned)
    }

    async fn delete_frontend(&self, id: &str) -> Result<(), ProxyError> {
        debug!("Deleting frontend {}", id);
        self.call("delete_frontend", self.api.delete_frontend(id)).await
    }

    /// A backend cannot be deleted while it still has servers
    async fn delete_backend(&self, id: &str) -> Result<(), ProxyError> {
        let servers = self.call("list_servers", self.api.list_servers(id)).await?;
        for server in &servers {
            debug!("Deleting server {} of backend {}", server.id, id);
            self.call("delete_server", self.api.delete_server(id, &server.id)).await?;
        }

        debug!("Deleting backend {}", id);
        self.call("delete_backend", self.api.delete_backend(id)).await
    }
}
