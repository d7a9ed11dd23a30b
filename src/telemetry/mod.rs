//! Telemetry: correlation ids, structured events, counters, metrics.

pub mod metrics;
pub mod recorder;
pub mod sink;

pub use recorder::{RequestTrace, TelemetryRecorder, TelemetryReport};
pub use sink::RotatingLogSink;
