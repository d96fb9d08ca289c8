//! Controller metrics
//!
//! Prometheus metrics for reconciliation outcomes, retries, the work queue and
//! vulcand API calls. Everything registers into `CONTROLLER_METRICS_REGISTRY`,
//! which the /metrics endpoint encodes.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Controller metrics registry
    pub static ref CONTROLLER_METRICS_REGISTRY: Registry = Registry::new();

    /// Ingress reconciliation duration
    static ref INGRESS_RECONCILIATION_DURATION: HistogramVec = {
        let opts = HistogramOpts::new(
            "ingress_reconciliation_duration_seconds",
            "Ingress reconciliation duration in seconds",
        );
        let histogram = HistogramVec::new(opts, &["ingress", "namespace"])
            .expect("Failed to create histogram");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// Ingress reconciliations total
    ///
    /// result: "upserted", "removed" or an error kind
    static ref INGRESS_RECONCILIATIONS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_reconciliations_total",
            "Total number of ingress reconciliations",
        );
        let counter = IntCounterVec::new(opts, &["ingress", "namespace", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Keys re-queued after a failed reconciliation
    ///
    /// reason: error kind of the failed attempt
    static ref INGRESS_REQUEUES_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_requeues_total",
            "Total number of rate limited ingress requeues",
        );
        let counter = IntCounterVec::new(opts, &["reason"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Keys dropped after exhausting their retries
    ///
    /// reason: error kind of the last attempt
    static ref INGRESS_DROPS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_drops_total",
            "Total number of ingress keys dropped after exhausting retries",
        );
        let counter = IntCounterVec::new(opts, &["reason"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Pending keys per work queue
    static ref WORK_QUEUE_DEPTH: IntGaugeVec = {
        let opts = Opts::new("workqueue_depth", "Current number of pending keys");
        let gauge = IntGaugeVec::new(opts, &["queue"])
            .expect("Failed to create gauge");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(gauge.clone()))
            .expect("Failed to register gauge");
        gauge
    };

    /// vulcand API calls by operation and result
    static ref VULCAN_API_CALLS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "vulcan_api_calls_total",
            "Total number of vulcand API calls",
        );
        let counter = IntCounterVec::new(opts, &["operation", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record Ingress reconciliation
pub fn record_ingress_reconciliation(
    ingress: &str,
    namespace: &str,
    duration_secs: f64,
    result: &str,
) {
    INGRESS_RECONCILIATION_DURATION
        .with_label_values(&[ingress, namespace])
        .observe(duration_secs);

    INGRESS_RECONCILIATIONS_TOTAL
        .with_label_values(&[ingress, namespace, result])
        .inc();
}

pub fn record_requeue(reason: &str) {
    INGRESS_REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_drop(reason: &str) {
    INGRESS_DROPS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_queue_depth(queue: &str, depth: usize) {
    WORK_QUEUE_DEPTH.with_label_values(&[queue]).set(depth as i64);
}

pub fn record_vulcan_call(operation: &str, result: &str) {
    VULCAN_API_CALLS_TOTAL.with_label_values(&[operation, result]).inc();
}

/// Gather controller metrics
pub fn gather_controller_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = CONTROLLER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
