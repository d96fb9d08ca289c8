//! Middleware registry
//!
//! Maps a middleware type (the `Type` of a `middleware.<name>` annotation) to
//! a parser that validates the raw JSON settings and re-encodes them as the
//! opaque object vulcand stores. Types without a parser are skipped by the
//! adapter.
//!
//! The registry is built explicitly and handed to the adapter:
//! ```rust,ignore
//! let registry = Arc::new(MiddlewareRegistry::with_defaults());
//! assert!(registry.parse("ratelimit", "{}").is_some());
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Parses raw middleware settings into their JSON object form
pub type MiddlewareParser = fn(&str) -> Result<Value, serde_json::Error>;

fn parse_as<T>(raw: &str) -> Result<Value, serde_json::Error>
where
    T: DeserializeOwned + Serialize,
{
    let settings: T = serde_json::from_str(raw)?;
    serde_json::to_value(settings)
}

/// Circuit breaker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CircuitBreakerSettings {
    pub condition: String,
    pub fallback: Value,
    pub on_tripped: Value,
    pub on_standby: Value,
    /// Nanoseconds
    pub fallback_duration: i64,
    pub recovery_duration: i64,
    pub check_period: i64,
}

/// Concurrent connection limit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConnLimitSettings {
    pub connections: i64,
    pub variable: String,
}

/// Request rate limit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RateLimitSettings {
    pub period_seconds: i64,
    pub requests: i64,
    pub burst: i64,
    pub variable: String,
    pub rate_var: String,
}

/// URL rewrite or redirect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RewriteSettings {
    pub regexp: String,
    pub replacement: String,
    pub rewrite_body: bool,
    pub redirect: bool,
}

/// Request tracing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TraceSettings {
    pub req_headers: Vec<String>,
    pub resp_headers: Vec<String>,
    pub addr: String,
}

/// OAuth2 login against an OIDC issuer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2Settings {
    #[serde(rename = "IssuerURL")]
    pub issuer_url: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    #[serde(rename = "ClientSecret")]
    pub client_secret: String,
    #[serde(rename = "RedirectURL")]
    pub redirect_url: String,
}

/// Basic auth checked against an authentication server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(rename = "ServerURL")]
    pub server_url: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Password")]
    pub password: String,
    /// Nanoseconds
    #[serde(rename = "CacheExpiration")]
    pub cache_expiration: i64,
}

/// Known middleware types and their parsers
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    parsers: HashMap<String, MiddlewareParser>,
}

impl MiddlewareRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every middleware type the proxy ships with
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("cbreaker", parse_as::<CircuitBreakerSettings>);
        registry.register("connlimit", parse_as::<ConnLimitSettings>);
        registry.register("ratelimit", parse_as::<RateLimitSettings>);
        registry.register("rewrite", parse_as::<RewriteSettings>);
        registry.register("trace", parse_as::<TraceSettings>);
        registry.register("oauth2", parse_as::<OAuth2Settings>);
        registry.register("auth", parse_as::<AuthSettings>);
        // Legacy name of "auth"
        registry.register("yieldrauth", parse_as::<AuthSettings>);
        registry
    }

    /// Register (or replace) the parser for `kind`
    pub fn register(&mut self, kind: impl Into<String>, parser: MiddlewareParser) {
        self.parsers.insert(kind.into(), parser);
    }

    /// Parse `raw` as settings of `kind`; `None` when the type is unknown
    pub fn parse(&self, kind: &str, raw: &str) -> Option<Result<Value, serde_json::Error>> {
        self.parsers.get(kind).map(|parser| parser(raw))
    }

    /// Registered types, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
