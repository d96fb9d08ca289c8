//! vulcan-ingress control plane
//!
//! Watches Ingress resources and reconciles them into a vulcand reverse
//! proxy. Exposes the building blocks so the binary and the integration
//! tests wire them the same way.

pub mod apis;
pub mod config;
pub mod controller;
pub mod error;
pub mod proxy;
pub mod queue;
pub mod server;
pub mod version;
