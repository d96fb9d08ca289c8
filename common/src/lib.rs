//! vulcan-ingress Common Types
//!
//! Ingress model plus the pure translation from an Ingress into the vulcand
//! object model (backends, frontends, servers, middlewares).
//!
//! Nothing in this crate talks to the network. The control plane feeds it a
//! `RoutingResource` and gets back the desired downstream objects together
//! with their deterministic identities.

pub mod annotations;
pub mod downstream;
pub mod resource;
pub mod translate;

pub use downstream::{
    desired_routes, DesiredRoute, DownstreamBackend, DownstreamFrontend, DownstreamMiddleware,
    DownstreamServer, MiddlewareDecl,
};
pub use resource::{BackendReference, IngressPath, IngressRule, RoutingResource, ServicePort};
pub use translate::{create_id, create_route, create_url, owner_prefix, owns_id};

/// Protocol type used for every backend and frontend we create
pub const HTTP: &str = "http";
