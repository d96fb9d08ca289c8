//! Ingress annotation contract
//!
//! Annotations tune the generated backend and frontend settings and declare
//! middlewares. Parsing never fails: `resolve_*` report whether a value was
//! absent, invalid or usable, and the `get_*` getters collapse that to the
//! type's default.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

// Backend settings
pub const READ_TIMEOUT: &str = "ingress.kubernetes.io/read-timeout";
pub const DIAL_TIMEOUT: &str = "ingress.kubernetes.io/dial-timeout";
pub const TLS_HANDSHAKE_TIMEOUT: &str = "ingress.kubernetes.io/tls-handshake-timeout";
pub const KEEP_ALIVE: &str = "ingress.kubernetes.io/keepalive";
pub const MAX_IDLE_CONNS_PER_HOST: &str = "ingress.kubernetes.io/max-idle-connections-per-host";

// Frontend settings
pub const TRUST_FORWARD_HEADER: &str = "ingress.kubernetes.io/trust-forward-header";
pub const PASS_HOST_HEADER: &str = "ingress.kubernetes.io/pass-host-header";
pub const MAX_BODY_BYTES: &str = "ingress.kubernetes.io/max-body-bytes";
pub const MAX_MEM_BODY_BYTES: &str = "ingress.kubernetes.io/max-mem-body-bytes";
pub const FAILOVER_PREDICATE: &str = "ingress.kubernetes.io/failover-predicate";
pub const HOSTNAME: &str = "ingress.kubernetes.io/hostname";

/// Prefix of the middleware annotation family (`<prefix><type>`)
pub const MIDDLEWARE_PREFIX: &str = "ingress.kubernetes.io/middleware.";

lazy_static! {
    static ref MIDDLEWARE_KEY: Regex = Regex::new(r"^ingress\.kubernetes\.io/middleware\.(.+)$")
        .expect("Failed to compile middleware annotation pattern");
}

/// Outcome of resolving one annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    /// Key not set on the resource
    Absent,
    /// Key set but the raw value could not be parsed
    Invalid(String),
    Value(T),
}

impl<T: Default> Resolved<T> {
    /// Collapse to the parsed value or `T::default()`
    pub fn or_default(self) -> T {
        match self {
            Resolved::Value(v) => v,
            Resolved::Absent | Resolved::Invalid(_) => T::default(),
        }
    }
}

pub type Annotations = BTreeMap<String, String>;

pub fn resolve_string(annotations: &Annotations, key: &str) -> Resolved<String> {
    match annotations.get(key) {
        Some(raw) => Resolved::Value(raw.clone()),
        None => Resolved::Absent,
    }
}

pub fn resolve_int(annotations: &Annotations, key: &str) -> Resolved<i64> {
    match annotations.get(key) {
        Some(raw) => match raw.parse::<i64>() {
            Ok(v) => Resolved::Value(v),
            Err(_) => Resolved::Invalid(raw.clone()),
        },
        None => Resolved::Absent,
    }
}

pub fn resolve_bool(annotations: &Annotations, key: &str) -> Resolved<bool> {
    match annotations.get(key) {
        Some(raw) => match parse_bool(raw) {
            Some(v) => Resolved::Value(v),
            None => Resolved::Invalid(raw.clone()),
        },
        None => Resolved::Absent,
    }
}

/// Accepts the same spellings as Go's `strconv.ParseBool`
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Raw value or empty string
pub fn get_string(annotations: &Annotations, key: &str) -> String {
    resolve_string(annotations, key).or_default()
}

/// Parsed integer or 0
pub fn get_int(annotations: &Annotations, key: &str) -> i64 {
    resolve_int(annotations, key).or_default()
}

/// Parsed boolean or false
pub fn get_bool(annotations: &Annotations, key: &str) -> bool {
    resolve_bool(annotations, key).or_default()
}

/// Middleware declarations, `type -> raw JSON settings`
pub fn get_middleware(annotations: &Annotations) -> BTreeMap<String, String> {
    annotations
        .iter()
        .filter_map(|(key, value)| {
            MIDDLEWARE_KEY
                .captures(key)
                .and_then(|caps| caps.get(1))
                .map(|m| (m.as_str().to_string(), value.clone()))
        })
        .collect()
}
