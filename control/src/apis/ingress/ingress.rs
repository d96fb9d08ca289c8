//! Ingress conversion
//!
//! Translates `networking.k8s.io/v1` Ingress objects into the cluster-agnostic
//! `RoutingResource` the reconciler works on.

use crate::error::ReconcileError;
use common::{BackendReference, IngressPath, IngressRule, RoutingResource, ServicePort};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend, ServiceBackendPort};
use kube::ResourceExt;
use tracing::warn;

/// Port used when a service backend names neither a number nor a port name
const DEFAULT_SERVICE_PORT: i32 = 80;

/// Work queue key of an Ingress (`namespace/name`)
pub fn ingress_key(ingress: &Ingress) -> Option<String> {
    let namespace = ingress.namespace()?;
    Some(format!("{}/{}", namespace, ingress.name_any()))
}

/// Split a `namespace/name` key
pub fn split_key(key: &str) -> Result<(&str, &str), ReconcileError> {
    match key.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace, name))
        }
        _ => Err(ReconcileError::InvalidKey(key.to_string())),
    }
}

fn service_port(port: Option<&ServiceBackendPort>) -> ServicePort {
    match port {
        Some(ServiceBackendPort {
            number: Some(number),
            ..
        }) => ServicePort::Number(*number),
        Some(ServiceBackendPort {
            name: Some(name), ..
        }) if !name.is_empty() => ServicePort::Name(name.clone()),
        _ => ServicePort::Number(DEFAULT_SERVICE_PORT),
    }
}

/// Service reference of a backend (resource backends are not supported)
fn backend_reference(backend: &IngressBackend, ingress: &str) -> Option<BackendReference> {
    match &backend.service {
        Some(service) => Some(BackendReference {
            service_name: service.name.clone(),
            service_port: service_port(service.port.as_ref()),
        }),
        None => {
            warn!(
                "Ingress {} has a backend without a service reference, skipping",
                ingress
            );
            None
        }
    }
}

/// Convert an Ingress into its routing resource
pub fn to_routing_resource(ingress: &Ingress) -> RoutingResource {
    let namespace = ingress.namespace().unwrap_or_else(|| "default".to_string());
    let name = ingress.name_any();
    let display = format!("{}/{}", namespace, name);

    let mut resource = RoutingResource::new(namespace, name);
    resource.annotations = ingress.annotations().clone();

    let Some(spec) = &ingress.spec else {
        return resource;
    };

    resource.default_backend = spec
        .default_backend
        .as_ref()
        .and_then(|backend| backend_reference(backend, &display));

    for rule in spec.rules.iter().flatten() {
        let Some(http) = &rule.http else {
            continue;
        };
        let paths = http
            .paths
            .iter()
            .filter_map(|path| {
                backend_reference(&path.backend, &display).map(|backend| IngressPath {
                    path: path.path.clone().unwrap_or_default(),
                    backend,
                })
            })
            .collect();

        resource.rules.push(IngressRule {
            host: rule.host.clone().unwrap_or_default(),
            paths,
        });
    }

    resource
}
