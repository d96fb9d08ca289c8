//! Configuration for the vulcan-ingress controller
//!
//! Defaults come from serde `default_*` functions; `from_env` overrides them
//! from `VULCAN_INGRESS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Base URL of the vulcand API (default: http://127.0.0.1:8182)
    #[serde(default = "default_vulcan_addr")]
    pub vulcan_addr: String,

    /// Number of reconcile workers (default: one per CPU)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// JSON array of routing resources to serve instead of watching the cluster
    #[serde(default)]
    pub resources_file: Option<String>,

    /// Bind address of the /metrics and /healthz listener
    #[serde(default = "default_metrics_bind_addr")]
    pub metrics_bind_addr: String,

    /// Re-enqueue every known Ingress at this interval (disabled when unset)
    #[serde(default)]
    pub resync_interval_secs: Option<u64>,

    /// Delete objects an Ingress no longer declares after a successful sync
    #[serde(default)]
    pub prune_stale_objects: bool,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry and rate limiting of failed reconciliations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Requeues before a key is dropped (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Timeout of a single vulcand API call in seconds (default: 10s)
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// First per-key backoff in milliseconds (default: 5ms)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-key backoff ceiling in seconds (default: 1000s)
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Overall requeue rate in keys per second (default: 10)
    #[serde(default = "default_bucket_rate")]
    pub bucket_rate: f64,

    /// Overall requeue burst (default: 100)
    #[serde(default = "default_bucket_burst")]
    pub bucket_burst: u64,
}

fn default_vulcan_addr() -> String {
    "http://127.0.0.1:8182".to_string()
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_metrics_bind_addr() -> String {
    "0.0.0.0:9102".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_call_timeout() -> u64 {
    10
}

fn default_base_delay_ms() -> u64 {
    5
}

fn default_max_delay() -> u64 {
    1000
}

fn default_bucket_rate() -> f64 {
    10.0
}

fn default_bucket_burst() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            call_timeout_secs: default_call_timeout(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay(),
            bucket_rate: default_bucket_rate(),
            bucket_burst: default_bucket_burst(),
        }
    }
}

impl RetryConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            vulcan_addr: default_vulcan_addr(),
            workers: default_workers(),
            resources_file: None,
            metrics_bind_addr: default_metrics_bind_addr(),
            resync_interval_secs: None,
            prune_stale_objects: false,
            retry: RetryConfig::default(),
        }
    }
}

/// Error for a malformed environment override
#[derive(Debug, thiserror::Error)]
#[error("Invalid value {value:?} for {var}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

fn parse_var<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError { var, value }),
        Err(_) => Ok(None),
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = env::var("VULCAN_INGRESS_VULCAN_ADDR") {
            config.vulcan_addr = val;
        }
        if let Ok(val) = env::var("VULCAN_INGRESS_METRICS_ADDR") {
            config.metrics_bind_addr = val;
        }
        if let Some(workers) = parse_var::<usize>("VULCAN_INGRESS_WORKERS")? {
            config.workers = workers.max(1);
        }
        if let Ok(path) = env::var("VULCAN_INGRESS_RESOURCES_FILE") {
            config.resources_file = (!path.is_empty()).then_some(path);
        }
        if let Some(secs) = parse_var::<u64>("VULCAN_INGRESS_RESYNC_SECS")? {
            config.resync_interval_secs = (secs > 0).then_some(secs);
        }
        if let Some(prune) = parse_var::<bool>("VULCAN_INGRESS_PRUNE")? {
            config.prune_stale_objects = prune;
        }
        if let Some(retries) = parse_var::<u32>("VULCAN_INGRESS_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(secs) = parse_var::<u64>("VULCAN_INGRESS_CALL_TIMEOUT_SECS")? {
            config.retry.call_timeout_secs = secs;
        }

        Ok(config)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.vulcan_addr, "http://127.0.0.1:8182");
        assert!(config.workers >= 1);
        assert_eq!(config.resources_file, None);
        assert!(!config.prune_stale_objects);
        assert_eq!(config.resync_interval(), None);
    }

    #[test]
    fn test_retry_defaults() {
        let config = ControllerConfig::default();

        assert_eq!(
            config.retry.max_retries, 5,
            "Keys are dropped after 5 requeues"
        );
        assert_eq!(config.retry.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.base_delay(), Duration::from_millis(5));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(1000));
        assert_eq!(config.retry.bucket_burst, 100);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ControllerConfig = serde_json::from_str(
            r#"{"vulcan_addr":"http://vulcand:8182","retry":{"max_retries":3}}"#,
        )
        .unwrap();

        assert_eq!(config.vulcan_addr, "http://vulcand:8182");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.call_timeout_secs, 10);
        assert_eq!(config.metrics_bind_addr, "0.0.0.0:9102");
    }
}
