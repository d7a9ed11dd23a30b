//! Operational endpoints exposed alongside the proxy surface.

pub mod handlers;

pub use handlers::{get_health, get_stats, get_status};
