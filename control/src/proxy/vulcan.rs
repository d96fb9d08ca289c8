//! vulcand v2 HTTP API client
//!
//! Endpoints used:
//! - `POST   /v2/backends`                      `{"Backend": ...}`
//! - `POST   /v2/frontends`                     `{"Frontend": ..., "TTL": "0s"}`
//! - `POST   /v2/backends/{id}/servers`         `{"Server": ..., "TTL": "0s"}`
//! - `POST   /v2/frontends/{id}/middlewares`    `{"Middleware": ..., "TTL": "0s"}`
//! - `GET    /v2/backends`, `/v2/frontends`, `/v2/backends/{id}/servers`,
//!   `/v2/frontends/{id}/middlewares`
//! - `DELETE /v2/backends/{id}`, `/v2/frontends/{id}`, `/v2/backends/{id}/servers/{sid}`,
//!   `/v2/frontends/{id}/middlewares/{mid}`
//!
//! A `TTL` of `0s` makes objects permanent. Deleting an object that does not
//! exist (404) counts as success.

use super::api::ProxyApi;
use crate::error::ProxyError;
use async_trait::async_trait;
use common::{DownstreamBackend, DownstreamFrontend, DownstreamMiddleware, DownstreamServer};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Objects never expire
const PERMANENT_TTL: &str = "0s";

#[derive(Serialize)]
struct BackendBody<'a> {
    #[serde(rename = "Backend")]
    backend: &'a DownstreamBackend,
}

#[derive(Serialize)]
struct FrontendBody<'a> {
    #[serde(rename = "Frontend")]
    frontend: &'a DownstreamFrontend,
    #[serde(rename = "TTL")]
    ttl: &'static str,
}

#[derive(Serialize)]
struct ServerBody<'a> {
    #[serde(rename = "Server")]
    server: &'a DownstreamServer,
    #[serde(rename = "TTL")]
    ttl: &'static str,
}

#[derive(Serialize)]
struct MiddlewareBody<'a> {
    #[serde(rename = "Middleware")]
    middleware: &'a DownstreamMiddleware,
    #[serde(rename = "TTL")]
    ttl: &'static str,
}

#[derive(Deserialize)]
struct BackendList {
    #[serde(rename = "Backends", default)]
    backends: Option<Vec<DownstreamBackend>>,
}

#[derive(Deserialize)]
struct FrontendList {
    #[serde(rename = "Frontends", default)]
    frontends: Option<Vec<DownstreamFrontend>>,
}

#[derive(Deserialize)]
struct ServerList {
    #[serde(rename = "Servers", default)]
    servers: Option<Vec<DownstreamServer>>,
}

#[derive(Deserialize)]
struct MiddlewareList {
    #[serde(rename = "Middlewares", default)]
    middlewares: Option<Vec<DownstreamMiddleware>>,
}

/// HTTP client for one vulcand API endpoint
#[derive(Clone)]
pub struct VulcanClient {
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl VulcanClient {
    /// Client for the API at `base_url` (e.g. `http://127.0.0.1:8182`)
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), ProxyError> {
        let transport = |message: String| ProxyError::Transport {
            operation: operation.to_string(),
            message,
        };

        let uri = format!("{}{}", self.base_url, path);
        debug!(operation = %operation, method = %method, uri = %uri, "vulcand request");

        let mut builder = Request::builder().method(method).uri(&uri);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| transport(format!("Invalid request to {}: {}", uri, e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| transport(format!("Failed to read response body: {}", e)))?
            .to_bytes();

        Ok((status, bytes))
    }

    async fn post<T: Serialize + Sync>(&self, operation: &str, path: &str, body: &T) -> Result<(), ProxyError> {
        let payload = serde_json::to_vec(body).map_err(ProxyError::Encode)?;
        let (status, bytes) = self.send(operation, Method::POST, path, Some(payload)).await?;
        expect_success(operation, status, &bytes)
    }

    async fn get<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T, ProxyError> {
        let (status, bytes) = self.send(operation, Method::GET, path, None).await?;
        expect_success(operation, status, &bytes)?;
        serde_json::from_slice(&bytes).map_err(|source| ProxyError::Decode {
            operation: operation.to_string(),
            source,
        })
    }

    async fn delete(&self, operation: &str, path: &str) -> Result<(), ProxyError> {
        let (status, bytes) = self.send(operation, Method::DELETE, path, None).await?;
        if status == StatusCode::NOT_FOUND {
            debug!(operation = %operation, path = %path, "Already deleted");
            return Ok(());
        }
        expect_success(operation, status, &bytes)
    }
}

fn expect_success(operation: &str, status: StatusCode, body: &[u8]) -> Result<(), ProxyError> {
    if status.is_success() {
        return Ok(());
    }
    Err(ProxyError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).trim().to_string(),
    })
}

#[async_trait]
impl ProxyApi for VulcanClient {
    async fn upsert_backend(&self, backend: &DownstreamBackend) -> Result<(), ProxyError> {
        self.post("upsert backend", "/v2/backends", &BackendBody { backend }).await
    }

    async fn upsert_frontend(&self, frontend: &DownstreamFrontend) -> Result<(), ProxyError> {
        let body = FrontendBody {
            frontend,
            ttl: PERMANENT_TTL,
        };
        self.post("upsert frontend", "/v2/frontends", &body).await
    }

    async fn upsert_server(
        &self,
        backend_id: &str,
        server: &DownstreamServer,
    ) -> Result<(), ProxyError> {
        let body = ServerBody {
            server,
            ttl: PERMANENT_TTL,
        };
        let path = format!("/v2/backends/{}/servers", backend_id);
        self.post("upsert server", &path, &body).await
    }

    async fn upsert_middleware(
        &self,
        frontend_id: &str,
        middleware: &DownstreamMiddleware,
    ) -> Result<(), ProxyError> {
        let body = MiddlewareBody {
            middleware,
            ttl: PERMANENT_TTL,
        };
        let path = format!("/v2/frontends/{}/middlewares", frontend_id);
        self.post("upsert middleware", &path, &body).await
    }

    async fn list_backends(&self) -> Result<Vec<DownstreamBackend>, ProxyError> {
        let list: BackendList = self.get("list backends", "/v2/backends").await?;
        Ok(list.backends.unwrap_or_default())
    }

    async fn list_frontends(&self) -> Result<Vec<DownstreamFrontend>, ProxyError> {
        let list: FrontendList = self.get("list frontends", "/v2/frontends").await?;
        Ok(list.frontends.unwrap_or_default())
    }

    async fn list_servers(&self, backend_id: &str) -> Result<Vec<DownstreamServer>, ProxyError> {
        let path = format!("/v2/backends/{}/servers", backend_id);
        let list: ServerList = self.get("list servers", &path).await?;
        Ok(list.servers.unwrap_or_default())
    }

    async fn list_middlewares(
        &self,
        frontend_id: &str,
    ) -> Result<Vec<DownstreamMiddleware>, ProxyError> {
        let path = format!("/v2/frontends/{}/middlewares", frontend_id);
        let list: MiddlewareList = self.get("list middlewares", &path).await?;
        Ok(list.middlewares.unwrap_or_default())
    }

    async fn delete_backend(&self, id: &str) -> Result<(), ProxyError> {
        self.delete("delete backend", &format!("/v2/backends/{}", id)).await
    }

    async fn delete_frontend(&self, id: &str) -> Result<(), ProxyError> {
        self.delete("delete frontend", &format!("/v2/frontends/{}", id)).await
    }

    async fn delete_server(&self, backend_id: &str, id: &str) -> Result<(), ProxyError> {
        let path = format!("/v2/backends/{}/servers/{}", backend_id, id);
        self.delete("delete server", &path).await
    }

    async fn delete_middleware(&self, frontend_id: &str, id: &str) -> Result<(), ProxyError> {
        let path = format!("/v2/frontends/{}/middlewares/{}", frontend_id, id);
        self.delete("delete middleware", &path).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::Response;
    use hyper_util::rt::TokioIo;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        body: Value,
    }

    /// Start a stub vulcand answering every request with `status` and `reply`
    async fn stub_vulcand(status: u16, reply: &'static str) -> (String, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&recorded);

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let log = Arc::clone(&log);
                        async move {
                            let method = req.method().to_string();
                            let path = req.uri().path().to_string();
                            let bytes = req.into_body().collect().await?.to_bytes();
                            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
                            log.lock().unwrap().push(Recorded { method, path, body });
                            Ok::<_, hyper::Error>(
                                Response::builder()
                                    .status(status)
                                    .body(Full::new(Bytes::from(reply)))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (format!("http://{}", addr), recorded)
    }

    fn frontend() -> DownstreamFrontend {
        DownstreamFrontend {
            id: "shop.web.api".to_string(),
            backend_id: "shop.web.api".to_string(),
            kind: "http".to_string(),
            route: "Host(`shop.example.com`) && PathRegexp(`/api`)".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_bodies() {
        let backend = DownstreamBackend {
            id: "shop.web.api".to_string(),
            kind: "http".to_string(),
            ..Default::default()
        };
        let body = serde_json::to_value(BackendBody { backend: &backend }).unwrap();
        assert_eq!(body["Backend"]["Id"], json!("shop.web.api"));
        assert!(body.get("TTL").is_none(), "Backends carry no TTL");

        let frontend = frontend();
        let body = serde_json::to_value(FrontendBody {
            frontend: &frontend,
            ttl: PERMANENT_TTL,
        })
        .unwrap();
        assert_eq!(body["TTL"], json!("0s"));
        assert_eq!(body["Frontend"]["BackendId"], json!("shop.web.api"));

        let server = DownstreamServer {
            id: "shop.web.api".to_string(),
            url: "http://api.shop:8080".to_string(),
        };
        let body = serde_json::to_value(ServerBody {
            server: &server,
            ttl: PERMANENT_TTL,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"Server": {"Id": "shop.web.api", "URL": "http://api.shop:8080"}, "TTL": "0s"})
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = VulcanClient::new("http://127.0.0.1:8182/");
        assert_eq!(client.base_url(), "http://127.0.0.1:8182");
    }

    #[tokio::test]
    async fn test_upsert_frontend_posts_json() {
        let (url, recorded) = stub_vulcand(200, "{}").await;
        let client = VulcanClient::new(url);

        client.upsert_frontend(&frontend()).await.unwrap();

        let requests = recorded.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/v2/frontends");
        assert_eq!(requests[0].body["Frontend"]["Id"], json!("shop.web.api"));
        assert_eq!(requests[0].body["TTL"], json!("0s"));
    }

    #[tokio::test]
    async fn test_upsert_server_targets_backend() {
        let (url, recorded) = stub_vulcand(200, "{}").await;
        let client = VulcanClient::new(url);
        let server = DownstreamServer {
            id: "shop.web.api".to_string(),
            url: "http://api.shop:8080".to_string(),
        };

        client.upsert_server("shop.web.api", &server).await.unwrap();

        let requests = recorded.lock().unwrap().clone();
        assert_eq!(requests[0].path, "/v2/backends/shop.web.api/servers");
    }

    #[tokio::test]
    async fn test_list_servers_decodes_response() {
        let (url, _) = stub_vulcand(
            200,
            r#"{"Servers":[{"Id":"shop.web.api","URL":"http://api.shop:8080"}]}"#,
        )
        .await;
        let client = VulcanClient::new(url);

        let servers = client.list_servers("shop.web.api").await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].url, "http://api.shop:8080");
    }

    #[tokio::test]
    async fn test_list_middlewares_of_frontend() {
        let (url, recorded) = stub_vulcand(
            200,
            r#"{"Middlewares":[{"Id":"shop.web.api.ratelimit","Priority":1,"Type":"ratelimit","Middleware":{"Requests":10}}]}"#,
        )
        .await;
        let client = VulcanClient::new(url);

        let middlewares = client.list_middlewares("shop.web.api").await.unwrap();
        assert_eq!(middlewares.len(), 1);
        assert_eq!(middlewares[0].id, "shop.web.api.ratelimit");
        assert_eq!(middlewares[0].middleware["Requests"], json!(10));

        client
            .delete_middleware("shop.web.api", "shop.web.api.ratelimit")
            .await
            .unwrap();
        let requests = recorded.lock().unwrap().clone();
        assert_eq!(requests[0].path, "/v2/frontends/shop.web.api/middlewares");
        assert_eq!(requests[1].method, "DELETE");
        assert_eq!(
            requests[1].path,
            "/v2/frontends/shop.web.api/middlewares/shop.web.api.ratelimit"
        );
    }

    #[tokio::test]
    async fn test_list_with_null_collection_is_empty() {
        let (url, _) = stub_vulcand(200, r#"{"Backends":null}"#).await;
        let client = VulcanClient::new(url);
        assert!(client.list_backends().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_object_succeeds() {
        let (url, recorded) = stub_vulcand(404, r#"{"message":"not found"}"#).await;
        let client = VulcanClient::new(url);

        client.delete_frontend("shop.web.api").await.unwrap();

        let requests = recorded.lock().unwrap().clone();
        assert_eq!(requests[0].method, "DELETE");
        assert_eq!(requests[0].path, "/v2/frontends/shop.web.api");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (url, _) = stub_vulcand(500, "boom").await;
        let client = VulcanClient::new(url);

        let err = client.delete_backend("shop.web.api").await.unwrap_err();
        match err {
            ProxyError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("Expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = VulcanClient::new(format!("http://{}", addr));
        let err = client.list_frontends().await.unwrap_err();
        assert!(matches!(err, ProxyError::Transport { .. }), "{:?}", err);
    }
}
