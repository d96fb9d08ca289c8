//! Identity, route and URL derivation
//!
//! Every downstream object created for an Ingress gets a composite ID of the
//! form `namespace.name.service[.extra...]`. All IDs of one Ingress share the
//! `namespace.name.` prefix, which is what bulk deletion scans for.

use crate::resource::ServicePort;

/// Separator between ID segments
pub const ID_SEPARATOR: char = '.';

/// Build the composite ID of a downstream object
///
/// Segments are joined with `.` in call order, so
/// `create_id(ns, n, svc, &[])` is always a prefix of
/// `create_id(ns, n, svc, &[extra])`.
pub fn create_id(namespace: &str, name: &str, service: &str, extra: &[&str]) -> String {
    let mut id = String::with_capacity(namespace.len() + name.len() + service.len() + 2);
    id.push_str(namespace);
    id.push(ID_SEPARATOR);
    id.push_str(name);
    id.push(ID_SEPARATOR);
    id.push_str(service);
    for segment in extra {
        id.push(ID_SEPARATOR);
        id.push_str(segment);
    }
    id
}

/// Prefix shared by every ID owned by `namespace/name`
///
/// Includes the trailing separator so that `web` never claims IDs of `web2`.
pub fn owner_prefix(namespace: &str, name: &str) -> String {
    format!("{}{}{}{}", namespace, ID_SEPARATOR, name, ID_SEPARATOR)
}

/// Whether `id` was derived from the Ingress `namespace/name`
pub fn owns_id(namespace: &str, name: &str, id: &str) -> bool {
    id.starts_with(&owner_prefix(namespace, name))
}

/// Build the vulcand route expression for a host/path pair
///
/// Empty host and path yields the empty (catch-all) route.
pub fn create_route(host: &str, path: &str) -> String {
    let mut clauses = Vec::with_capacity(2);
    if !host.is_empty() {
        clauses.push(format!("Host(`{}`)", host));
    }
    if !path.is_empty() {
        clauses.push(format!("PathRegexp(`{}`)", path));
    }
    clauses.join(" && ")
}

/// Same-cluster DNS URL of a Service port
pub fn create_url(namespace: &str, service: &str, port: &ServicePort) -> String {
    format!("http://{}.{}:{}", service, namespace, port)
}
