//! Local mirror of Ingress objects
//!
//! The reconciler never talks to the API server directly. It reads the latest
//! known state from a `ResourceMirror`, which in cluster mode is a kube
//! reflector store kept current by `watch_ingresses`.

use super::ingress::{ingress_key, split_key, to_routing_resource};
use crate::queue::WorkQueue;
use common::RoutingResource;
use futures::StreamExt;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::watcher;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::WatchStreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

#[inline]
fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

#[inline]
fn safe_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Read access to the latest known routing resources
pub trait ResourceMirror: Send + Sync {
    /// Resource stored under `namespace/name`; `None` when it no longer exists
    fn get(&self, key: &str) -> Option<RoutingResource>;

    /// Keys of every stored resource
    fn keys(&self) -> Vec<String>;
}

/// Mirror backed by a kube reflector store
#[derive(Clone)]
pub struct KubeMirror {
    store: Store<Ingress>,
}

impl KubeMirror {
    pub fn new(store: Store<Ingress>) -> Self {
        Self { store }
    }
}

impl ResourceMirror for KubeMirror {
    fn get(&self, key: &str) -> Option<RoutingResource> {
        // Malformed keys surface as InvalidKey on the removal path
        let (namespace, name) = split_key(key).ok()?;
        self.store
            .get(&ObjectRef::new(name).within(namespace))
            .map(|ingress| to_routing_resource(&ingress))
    }

    fn keys(&self) -> Vec<String> {
        self.store
            .state()
            .iter()
            .filter_map(|ingress| ingress_key(ingress))
            .collect()
    }
}

/// In-memory mirror, filled from a resources file or by tests
#[derive(Default)]
pub struct StaticMirror {
    resources: RwLock<BTreeMap<String, RoutingResource>>,
}

impl StaticMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror holding every resource of a JSON array
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let resources: Vec<RoutingResource> = serde_json::from_str(json)?;
        let mirror = Self::new();
        for resource in resources {
            mirror.insert(resource);
        }
        Ok(mirror)
    }

    /// Store `resource`, returning its key
    pub fn insert(&self, resource: RoutingResource) -> String {
        let key = resource.key();
        safe_write(&self.resources).insert(key.clone(), resource);
        key
    }

    pub fn remove(&self, key: &str) -> Option<RoutingResource> {
        safe_write(&self.resources).remove(key)
    }
}

impl ResourceMirror for StaticMirror {
    fn get(&self, key: &str) -> Option<RoutingResource> {
        safe_read(&self.resources).get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        safe_read(&self.resources).keys().cloned().collect()
    }
}

/// Tracks which Ingress keys the watcher has seen
///
/// A relist (`Init` .. `InitDone`) replaces the store wholesale, so objects
/// deleted while the watch was down never produce a `Delete` event. Keys known
/// before the relist but missing from it are reported at `InitDone`.
#[derive(Debug, Default)]
struct KeyTracker {
    known: BTreeSet<String>,
    relisted: Option<BTreeSet<String>>,
}

impl KeyTracker {
    /// Keys to enqueue for `event`
    fn observe(&mut self, event: &watcher::Event<Ingress>) -> Vec<String> {
        match event {
            watcher::Event::Apply(ingress) => ingress_key(ingress)
                .map(|key| {
                    self.known.insert(key.clone());
                    vec![key]
                })
                .unwrap_or_default(),
            watcher::Event::Delete(ingress) => ingress_key(ingress)
                .map(|key| {
                    self.known.remove(&key);
                    vec![key]
                })
                .unwrap_or_default(),
            watcher::Event::Init => {
                self.relisted = Some(BTreeSet::new());
                vec![]
            }
            watcher::Event::InitApply(ingress) => ingress_key(ingress)
                .map(|key| {
                    match self.relisted.as_mut() {
                        Some(relisted) => relisted.insert(key.clone()),
                        None => self.known.insert(key.clone()),
                    };
                    vec![key]
                })
                .unwrap_or_default(),
            watcher::Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return vec![];
                };
                let vanished = self.known.difference(&relisted).cloned().collect();
                self.known = relisted;
                vanished
            }
        }
    }
}

/// Watch Ingresses, keep `writer`'s store current and enqueue changed keys
///
/// Additions, updates and deletions all enqueue `namespace/name`; the
/// reconciler decides from the mirror whether the key still exists. Keys that
/// disappear across a relist are enqueued once the new list is complete.
pub async fn watch_ingresses(
    api: Api<Ingress>,
    writer: Writer<Ingress>,
    queue: Arc<WorkQueue<String>>,
) {
    let events = watcher(api, WatcherConfig::default()).default_backoff();
    let stream = reflector::reflector(writer, events);
    futures::pin_mut!(stream);

    info!("Starting Ingress watcher");
    let mut tracker = KeyTracker::default();

    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                match &event {
                    watcher::Event::Init => debug!("Ingress watcher listing"),
                    watcher::Event::InitDone => info!("Ingress watcher list complete"),
                    _ => {}
                }
                for key in tracker.observe(&event) {
                    debug!("Ingress event for {}", key);
                    queue.add(key);
                }
            }
            Err(e) => {
                warn!("Ingress watcher error: {}", e);
            }
        }
    }

    info!("Ingress watcher stopped");
}

/// Re-enqueue every mirrored key once per `interval`
pub async fn resync_periodically(
    mirror: Arc<dyn ResourceMirror>,
    queue: Arc<WorkQueue<String>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately; the watcher already delivered the initial list
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if queue.is_shutting_down() {
            return;
        }
        let keys = mirror.keys();
        debug!("Resyncing {} ingresses", keys.len());
        for key in keys {
            queue.add(key);
        }
    }
}
