//! Downstream (vulcand) object model
//!
//! Types serialize to the vulcand v2 API wire shape. `desired_routes` turns a
//! `RoutingResource` into the ordered list of objects the reconciler syncs.

use crate::annotations::{self, Annotations};
use crate::resource::{BackendReference, RoutingResource};
use crate::translate::{create_id, create_route, create_url};
use crate::HTTP;
use serde::{Deserialize, Serialize};

/// Default middleware priority (vulcand runs lower values first)
pub const DEFAULT_MIDDLEWARE_PRIORITY: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackendTimeouts {
    #[serde(default)]
    pub read: String,
    #[serde(default)]
    pub dial: String,
    #[serde(default, rename = "TLSHandshake")]
    pub tls_handshake: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackendKeepAlive {
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub max_idle_conns_per_host: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackendSettings {
    #[serde(default)]
    pub timeouts: BackendTimeouts,
    #[serde(default)]
    pub keep_alive: BackendKeepAlive,
}

/// vulcand backend: a named pool of servers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownstreamBackend {
    pub id: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(default)]
    pub settings: BackendSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrontendLimits {
    #[serde(default)]
    pub max_mem_body_bytes: i64,
    #[serde(default)]
    pub max_body_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrontendSettings {
    #[serde(default)]
    pub limits: FrontendLimits,
    #[serde(default)]
    pub failover_predicate: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub trust_forward_header: bool,
    #[serde(default)]
    pub pass_host_header: bool,
}

/// vulcand frontend: a route expression bound to a backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownstreamFrontend {
    pub id: String,
    #[serde(default)]
    pub backend_id: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub settings: FrontendSettings,
}

/// vulcand server: one upstream URL inside a backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownstreamServer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "URL", default)]
    pub url: String,
}

/// vulcand middleware attached to a frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownstreamMiddleware {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "Type")]
    pub kind: String,
    /// Plugin-specific settings, opaque to the controller
    pub middleware: serde_json::Value,
}

/// Middleware declared through an annotation, not yet resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareDecl {
    /// Object ID (`frontend id` + `.type`)
    pub id: String,
    /// Plugin type name
    pub kind: String,
    /// Raw JSON settings from the annotation
    pub raw: String,
}

/// Everything one backend reference of an Ingress maps to
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredRoute {
    pub backend: DownstreamBackend,
    pub frontend: DownstreamFrontend,
    pub server: DownstreamServer,
    pub middlewares: Vec<MiddlewareDecl>,
}

impl DesiredRoute {
    /// Backend ID (also the frontend and server ID)
    pub fn id(&self) -> &str {
        &self.backend.id
    }
}

/// Backend settings resolved from the resource annotations
pub fn backend_for(resource: &RoutingResource, reference: &BackendReference) -> DownstreamBackend {
    let a = &resource.annotations;
    DownstreamBackend {
        id: resource_id(resource, reference, &[]),
        kind: HTTP.to_string(),
        settings: BackendSettings {
            timeouts: BackendTimeouts {
                read: annotations::get_string(a, annotations::READ_TIMEOUT),
                dial: annotations::get_string(a, annotations::DIAL_TIMEOUT),
                tls_handshake: annotations::get_string(a, annotations::TLS_HANDSHAKE_TIMEOUT),
            },
            keep_alive: BackendKeepAlive {
                period: annotations::get_string(a, annotations::KEEP_ALIVE),
                max_idle_conns_per_host: annotations::get_int(
                    a,
                    annotations::MAX_IDLE_CONNS_PER_HOST,
                ),
            },
        },
    }
}

pub fn frontend_for(
    resource: &RoutingResource,
    reference: &BackendReference,
    host: &str,
    path: &str,
) -> DownstreamFrontend {
    let id = resource_id(resource, reference, &[]);
    DownstreamFrontend {
        backend_id: id.clone(),
        id,
        kind: HTTP.to_string(),
        route: create_route(host, path),
        settings: frontend_settings(&resource.annotations),
    }
}

fn frontend_settings(a: &Annotations) -> FrontendSettings {
    FrontendSettings {
        limits: FrontendLimits {
            max_mem_body_bytes: annotations::get_int(a, annotations::MAX_MEM_BODY_BYTES),
            max_body_bytes: annotations::get_int(a, annotations::MAX_BODY_BYTES),
        },
        failover_predicate: annotations::get_string(a, annotations::FAILOVER_PREDICATE),
        hostname: annotations::get_string(a, annotations::HOSTNAME),
        trust_forward_header: annotations::get_bool(a, annotations::TRUST_FORWARD_HEADER),
        pass_host_header: annotations::get_bool(a, annotations::PASS_HOST_HEADER),
    }
}

pub fn server_for(resource: &RoutingResource, reference: &BackendReference) -> DownstreamServer {
    DownstreamServer {
        id: resource_id(resource, reference, &[]),
        url: create_url(
            &resource.namespace,
            &reference.service_name,
            &reference.service_port,
        ),
    }
}

pub fn middlewares_for(
    resource: &RoutingResource,
    reference: &BackendReference,
) -> Vec<MiddlewareDecl> {
    annotations::get_middleware(&resource.annotations)
        .into_iter()
        .map(|(kind, raw)| MiddlewareDecl {
            id: resource_id(resource, reference, &[&kind]),
            kind,
            raw,
        })
        .collect()
}

fn resource_id(resource: &RoutingResource, reference: &BackendReference, extra: &[&str]) -> String {
    create_id(
        &resource.namespace,
        &resource.name,
        &reference.service_name,
        extra,
    )
}

/// Desired downstream state of a resource, in sync order
///
/// The default backend (if any) comes first with a catch-all route and no
/// middleware, followed by one entry per rule path in declaration order.
pub fn desired_routes(resource: &RoutingResource) -> Vec<DesiredRoute> {
    let mut routes = Vec::new();

    if let Some(reference) = &resource.default_backend {
        routes.push(DesiredRoute {
            backend: backend_for(resource, reference),
            frontend: frontend_for(resource, reference, "", ""),
            server: server_for(resource, reference),
            middlewares: Vec::new(),
        });
    }

    for rule in &resource.rules {
        for path in &rule.paths {
            routes.push(DesiredRoute {
                backend: backend_for(resource, &path.backend),
                frontend: frontend_for(resource, &path.backend, &rule.host, &path.path),
                server: server_for(resource, &path.backend),
                middlewares: middlewares_for(resource, &path.backend),
            });
        }
    }

    routes
}
