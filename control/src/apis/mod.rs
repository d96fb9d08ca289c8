//! Kubernetes API integrations
//!
//! This module contains the Ingress watcher and controller metrics.

pub mod ingress;
pub mod metrics;
