//! Observability endpoint
//!
//! `GET /metrics` serves the controller registry in Prometheus text format,
//! `GET /healthz` answers `ok` while the process is up.

use crate::apis::metrics::gather_controller_metrics;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// Answer one request
pub fn handle(method: &Method, path: &str) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => match gather_controller_metrics() {
            Ok(metrics) => text_response(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                metrics,
            ),
            Err(e) => {
                error!("{}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e)
            }
        },
        (&Method::GET, "/healthz") => {
            text_response(StatusCode::OK, "text/plain", "ok".to_string())
        }
        (_, "/metrics") | (_, "/healthz") => text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain",
            "Method Not Allowed".to_string(),
        ),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    }
}

/// Serve `listener` until `cancel_rx` fires
pub async fn serve(listener: TcpListener, mut cancel_rx: oneshot::Receiver<()>) {
    match listener.local_addr() {
        Ok(addr) => info!("Metrics endpoint listening on {}", addr),
        Err(e) => debug!("Metrics endpoint address unavailable: {}", e),
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted metrics connection from {}", peer_addr);
                        tokio::spawn(async move {
                            let service = service_fn(|req: Request<Incoming>| async move {
                                Ok::<_, Infallible>(handle(req.method(), req.uri().path()))
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Metrics accept error: {}", e);
                    }
                }
            }
            _ = &mut cancel_rx => {
                info!("Metrics endpoint received shutdown signal");
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::apis::metrics::record_vulcan_call;
    use http_body_util::BodyExt;
    use hyper_util::client::legacy::Client;
    use hyper_util::rt::TokioExecutor;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = handle(&Method::GET, "/healthz");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_metrics_contains_controller_metrics() {
        record_vulcan_call("upsert_backend", "success");

        let response = handle(&Method::GET, "/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("vulcan_api_calls_total"));
    }

    #[test]
    fn test_unknown_path_and_method() {
        assert_eq!(handle(&Method::GET, "/").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            handle(&Method::POST, "/metrics").status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_serve_answers_over_http() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let server = tokio::spawn(serve(listener, cancel_rx));

        let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build_http();
        let response = client
            .get(format!("http://{}/healthz", addr).parse().unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        cancel_tx.send(()).unwrap();
        server.await.unwrap();
    }
}
