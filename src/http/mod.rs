//! Inbound HTTP surface: server wiring, gateway handler, responses.

pub mod response;
pub mod server;

pub use server::{AppState, GatewaySnapshot, HttpServer, StartupError};
