use anyhow::{Context, Result};
use control::apis::ingress::mirror::{
    resync_periodically, watch_ingresses, KubeMirror, ResourceMirror, StaticMirror,
};
use control::config::ControllerConfig;
use control::controller::IngressController;
use control::proxy::{MiddlewareRegistry, ProxyAdapter, VulcanClient};
use control::queue::{default_controller_rate_limiter, WorkQueue};
use control::{server, version};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::runtime::reflector;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// vulcan-ingress: reconciles Kubernetes Ingresses into vulcand
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{}", version::long_version());

    let config = ControllerConfig::from_env().context("Invalid configuration")?;
    let retry = config.retry.clone();
    info!(
        vulcan = %config.vulcan_addr,
        workers = config.workers,
        max_retries = retry.max_retries,
        prune = config.prune_stale_objects,
        "Configuration loaded"
    );

    let queue: Arc<WorkQueue<String>> = WorkQueue::new(
        "ingress",
        Box::new(default_controller_rate_limiter(
            retry.base_delay(),
            retry.max_delay(),
            retry.bucket_rate,
            retry.bucket_burst,
        )),
    );

    let mut background = vec![];

    let mirror: Arc<dyn ResourceMirror> = if let Some(path) = &config.resources_file {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read resources file {}", path))?;
        let mirror = StaticMirror::from_json(&json)
            .with_context(|| format!("Invalid resources file {}", path))?;
        let keys = mirror.keys();
        warn!(
            "Serving {} Ingresses from {}; the cluster is not watched",
            keys.len(),
            path
        );
        for key in keys {
            queue.add(key);
        }
        Arc::new(mirror)
    } else {
        let client = kube::Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        let api: Api<Ingress> = Api::all(client);
        let (store, writer) = reflector::store();

        background.push(tokio::spawn(watch_ingresses(api, writer, Arc::clone(&queue))));

        info!("Waiting for Ingress cache to sync");
        store
            .wait_until_ready()
            .await
            .context("Ingress cache failed to sync")?;
        Arc::new(KubeMirror::new(store))
    };

    if let Some(interval) = config.resync_interval() {
        info!("Resyncing all Ingresses every {:?}", interval);
        background.push(tokio::spawn(resync_periodically(
            Arc::clone(&mirror),
            Arc::clone(&queue),
            interval,
        )));
    }

    let listener = TcpListener::bind(&config.metrics_bind_addr)
        .await
        .with_context(|| {
            format!(
                "Failed to bind metrics endpoint {}",
                config.metrics_bind_addr
            )
        })?;
    let (metrics_cancel, metrics_cancel_rx) = oneshot::channel();
    let metrics_server = tokio::spawn(server::serve(listener, metrics_cancel_rx));

    let registry = Arc::new(MiddlewareRegistry::with_defaults());
    info!("Middleware types: {}", registry.kinds().join(", "));
    let proxy = ProxyAdapter::new(
        Arc::new(VulcanClient::new(config.vulcan_addr.clone())),
        registry,
        retry.call_timeout(),
    );
    let controller = Arc::new(
        IngressController::new(mirror, Arc::clone(&queue), proxy)
            .with_max_retries(retry.max_retries)
            .with_pruning(config.prune_stale_objects),
    );

    info!("Press Ctrl-C to exit.");
    controller
        .run(config.workers, async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await;

    // Cleanup: stop the watcher, resync and metrics tasks
    for handle in background {
        handle.abort();
    }
    let _ = metrics_cancel.send(());
    let _ = metrics_server.await;

    Ok(())
}
