//! API Gateway Library
//!
//! A versioned API gateway: inbound requests are tagged with an API version,
//! matched against ordered route rules, path-rewritten, and forwarded to
//! backend services over pooled connections, with correlated telemetry for
//! every request/response pair.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod proxy;
pub mod registry;
pub mod routing;
pub mod telemetry;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
