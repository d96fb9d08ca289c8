//! Raw proxy configuration operations
//!
//! Every operation is idempotent: upserts replace an existing object with the
//! same ID and deleting a missing object succeeds.

use crate::error::ProxyError;
use async_trait::async_trait;
use common::{DownstreamBackend, DownstreamFrontend, DownstreamMiddleware, DownstreamServer};

#[async_trait]
pub trait ProxyApi: Send + Sync {
    async fn upsert_backend(&self, backend: &DownstreamBackend) -> Result<(), ProxyError>;

    async fn upsert_frontend(&self, frontend: &DownstreamFrontend) -> Result<(), ProxyError>;

    async fn upsert_server(
        &self,
        backend_id: &str,
        server: &DownstreamServer,
    ) -> Result<(), ProxyError>;

    async fn upsert_middleware(
        &self,
        frontend_id: &str,
        middleware: &DownstreamMiddleware,
    ) -> Result<(), ProxyError>;

    async fn list_backends(&self) -> Result<Vec<DownstreamBackend>, ProxyError>;

    async fn list_frontends(&self) -> Result<Vec<DownstreamFrontend>, ProxyError>;

    async fn list_servers(&self, backend_id: &str) -> Result<Vec<DownstreamServer>, ProxyError>;

    async fn list_middlewares(
        &self,
        frontend_id: &str,
    ) -> Result<Vec<DownstreamMiddleware>, ProxyError>;

    /// Delete a backend (its servers must already be gone)
    async fn delete_backend(&self, id: &str) -> Result<(), ProxyError>;

    /// Delete a frontend together with its middlewares
    async fn delete_frontend(&self, id: &str) -> Result<(), ProxyError>;

    async fn delete_server(&self, backend_id: &str, id: &str) -> Result<(), ProxyError>;

    async fn delete_middleware(&self, frontend_id: &str, id: &str) -> Result<(), ProxyError>;
}
