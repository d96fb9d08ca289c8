//! Routing resource model
//!
//! A cluster-agnostic view of an Ingress: identity, default backend, ordered
//! host/path rules and the raw annotation map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Service port reference, numeric or named
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServicePort {
    Number(i32),
    Name(String),
}

impl fmt::Display for ServicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServicePort::Number(n) => write!(f, "{}", n),
            ServicePort::Name(name) => f.write_str(name),
        }
    }
}

impl From<i32> for ServicePort {
    fn from(n: i32) -> Self {
        ServicePort::Number(n)
    }
}

impl From<&str> for ServicePort {
    fn from(name: &str) -> Self {
        ServicePort::Name(name.to_string())
    }
}

/// Reference to a Service and one of its ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendReference {
    pub service_name: String,
    pub service_port: ServicePort,
}

impl BackendReference {
    pub fn new(service_name: impl Into<String>, service_port: impl Into<ServicePort>) -> Self {
        Self {
            service_name: service_name.into(),
            service_port: service_port.into(),
        }
    }
}

/// A single path entry inside a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressPath {
    /// Path regular expression (empty matches every path)
    #[serde(default)]
    pub path: String,
    pub backend: BackendReference,
}

/// Host rule with its ordered paths
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngressRule {
    /// Host to match (empty matches every host)
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub paths: Vec<IngressPath>,
}

/// Desired routing state of one Ingress, keyed by `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingResource {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub default_backend: Option<BackendReference>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl RoutingResource {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Work queue key (`namespace/name`)
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn with_default_backend(mut self, backend: BackendReference) -> Self {
        self.default_backend = Some(backend);
        self
    }

    pub fn with_rule(mut self, rule: IngressRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

impl IngressRule {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            paths: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>, backend: BackendReference) -> Self {
        self.paths.push(IngressPath {
            path: path.into(),
            backend,
        });
        self
    }
}
