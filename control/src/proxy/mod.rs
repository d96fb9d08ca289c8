//! vulcand configuration plumbing
//!
//! - `api`: the raw, idempotent remote operations (`ProxyApi`)
//! - `vulcan`: `ProxyApi` over the vulcand v2 HTTP API
//! - `registry`: middleware types and their settings parsers
//! - `adapter`: timeouts, middleware resolution and prefix deletion on top

pub mod adapter;
pub mod api;
pub mod registry;
pub mod vulcan;

pub use adapter::ProxyAdapter;
pub use api::ProxyApi;
pub use registry::MiddlewareRegistry;
pub use vulcan::VulcanClient;
