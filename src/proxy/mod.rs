//! Outbound proxying: pooled clients, forwarding, health probes, stats.

pub mod engine;
pub mod stats;

pub use engine::{FailureKind, ProxyEngine, ProxyError};
pub use stats::{ServiceStats, ServiceStatsSnapshot, StatsRegistry, StatsReport};
