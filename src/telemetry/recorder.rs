//! Correlated request telemetry.
//!
//! # Responsibilities
//! - Assign a monotonically increasing correlation id per request
//! - Track in-flight requests, enriched as resolution proceeds
//! - Emit structured events (received, routed, responded, error) to the
//!   tracing subscriber and the optional file sink
//! - Maintain rolling counters by path, by service, and by error kind
//!
//! # Design Decisions
//! - Excluded paths (health probes, metrics scrapes) are never logged so
//!   telemetry noise cannot drown real traffic
//! - Sink failures degrade to stderr inside the sink; nothing here can
//!   abort the request being described

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::schema::TelemetryConfig;
use crate::routing::ResolvedRoute;

use super::sink::RotatingLogSink;

/// In-flight record for one request, removed on completion.
#[derive(Debug)]
pub struct RequestTrace {
    pub request_id: u64,
    pub start: Instant,
    pub method: String,
    pub path: String,
    pub resolved_version: Option<String>,
    pub service: Option<String>,
    pub rewritten_path: Option<String>,
    excluded: bool,
}

#[derive(Debug, Default)]
struct LatencyMean {
    count: u64,
    avg_ms: f64,
}

/// Records correlated events and rolling counters for every request.
pub struct TelemetryRecorder {
    next_id: AtomicU64,
    in_flight: DashMap<u64, RequestTrace>,
    path_counts: DashMap<String, AtomicU64>,
    service_counts: DashMap<String, AtomicU64>,
    error_counts: DashMap<String, AtomicU64>,
    latency: Mutex<LatencyMean>,
    excluded_paths: Vec<String>,
    sink: Option<RotatingLogSink>,
}

impl TelemetryRecorder {
    pub fn new(config: &TelemetryConfig) -> Self {
        let sink = config.log_path.as_ref().and_then(|path| {
            match RotatingLogSink::open(Path::new(path), config.max_log_bytes) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    eprintln!("api-gateway: cannot open telemetry log {path}: {e}");
                    None
                }
            }
        });

        Self {
            next_id: AtomicU64::new(0),
            in_flight: DashMap::new(),
            path_counts: DashMap::new(),
            service_counts: DashMap::new(),
            error_counts: DashMap::new(),
            latency: Mutex::new(LatencyMean::default()),
            excluded_paths: config.excluded_paths.clone(),
            sink,
        }
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| path.starts_with(p))
    }

    fn bump(map: &DashMap<String, AtomicU64>, key: &str) {
        map.entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn emit(&self, event: serde_json::Value) {
        if let Some(sink) = &self.sink {
            sink.write_event(&event);
        }
    }

    /// Register an arriving request and return its correlation id.
    pub fn on_received(&self, method: &str, path: &str) -> u64 {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let excluded = self.is_excluded(path);

        self.in_flight.insert(
            request_id,
            RequestTrace {
                request_id,
                start: Instant::now(),
                method: method.to_string(),
                path: path.to_string(),
                resolved_version: None,
                service: None,
                rewritten_path: None,
                excluded,
            },
        );

        if !excluded {
            Self::bump(&self.path_counts, path);
            tracing::info!(request_id, method, path, "Request received");
            self.emit(serde_json::json!({
                "event": "received",
                "request_id": request_id,
                "method": method,
                "path": path,
            }));
        }

        request_id
    }

    /// Record the resolved target for a request.
    pub fn on_routed(&self, request_id: u64, route: &ResolvedRoute) {
        let mut excluded = false;
        if let Some(mut trace) = self.in_flight.get_mut(&request_id) {
            trace.resolved_version = Some(route.matched_version.clone());
            trace.service = Some(route.target_service.clone());
            trace.rewritten_path = Some(route.rewritten_path.clone());
            excluded = trace.excluded;
        }

        if !excluded {
            tracing::debug!(
                request_id,
                service = %route.target_service,
                version = %route.matched_version,
                target = %route.target_url,
                rewritten_path = %route.rewritten_path,
                "Target resolved"
            );
            self.emit(serde_json::json!({
                "event": "routed",
                "request_id": request_id,
                "service": route.target_service,
                "version": route.matched_version,
                "target_url": route.target_url,
                "rewritten_path": route.rewritten_path,
            }));
        }
    }

    /// Close a request that produced a response.
    pub fn on_responded(&self, request_id: u64, status: u16, duration_ms: f64) {
        let Some((_, trace)) = self.in_flight.remove(&request_id) else {
            return;
        };

        if trace.excluded {
            return;
        }

        if let Some(service) = &trace.service {
            Self::bump(&self.service_counts, service);
        }
        if status >= 500 {
            Self::bump(&self.error_counts, "upstream_5xx");
        }

        {
            let mut latency = self
                .latency
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            latency.count += 1;
            latency.avg_ms += (duration_ms - latency.avg_ms) / latency.count as f64;
        }

        tracing::info!(
            request_id,
            status,
            duration_ms,
            path = %trace.path,
            "Request responded"
        );
        self.emit(serde_json::json!({
            "event": "responded",
            "request_id": request_id,
            "status": status,
            "duration_ms": duration_ms,
            "method": trace.method,
            "path": trace.path,
            "service": trace.service,
        }));
    }

    /// Close a request that failed, indexed by error kind.
    pub fn on_error(&self, request_id: u64, kind: &str, service: &str) {
        let trace = self.in_flight.remove(&request_id).map(|(_, t)| t);
        let excluded = trace.as_ref().map(|t| t.excluded).unwrap_or(false);

        Self::bump(&self.error_counts, kind);
        Self::bump(&self.service_counts, service);

        if !excluded {
            tracing::error!(request_id, kind, service, "Request failed");
            self.emit(serde_json::json!({
                "event": "error",
                "request_id": request_id,
                "kind": kind,
                "service": service,
            }));
        }
    }

    /// Close a request whose caller went away before the response finished.
    pub fn on_aborted(&self, request_id: u64) {
        let Some((_, trace)) = self.in_flight.remove(&request_id) else {
            return;
        };
        if !trace.excluded {
            let duration_ms = trace.start.elapsed().as_secs_f64() * 1000.0;
            tracing::warn!(request_id, path = %trace.path, duration_ms, "Request aborted by caller");
            self.emit(serde_json::json!({
                "event": "aborted",
                "request_id": request_id,
                "path": trace.path,
                "duration_ms": duration_ms,
            }));
        }
    }

    /// Number of requests currently tracked.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Rolling counters for the stats endpoint.
    pub fn report(&self) -> TelemetryReport {
        let collect = |map: &DashMap<String, AtomicU64>| {
            map.iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect::<BTreeMap<_, _>>()
        };
        let latency = self
            .latency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        TelemetryReport {
            moving_avg_latency_ms: latency.avg_ms,
            completed: latency.count,
            in_flight: self.in_flight.len() as u64,
            by_path: collect(&self.path_counts),
            by_service: collect(&self.service_counts),
            by_error_kind: collect(&self.error_counts),
        }
    }
}

/// Serializable counter snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport {
    pub moving_avg_latency_ms: f64,
    pub completed: u64,
    pub in_flight: u64,
    pub by_path: BTreeMap<String, u64>,
    pub by_service: BTreeMap<String, u64>,
    pub by_error_kind: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> TelemetryRecorder {
        TelemetryRecorder::new(&TelemetryConfig::default())
    }

    #[test]
    fn correlation_ids_are_monotonic_and_unique() {
        let recorder = recorder();
        let a = recorder.on_received("GET", "/api/v1/companies");
        let b = recorder.on_received("GET", "/api/v1/persons");
        assert!(b > a);
        assert_eq!(recorder.in_flight_len(), 2);
    }

    #[test]
    fn responded_removes_from_in_flight() {
        let recorder = recorder();
        let id = recorder.on_received("GET", "/api/v1/companies");
        assert_eq!(recorder.in_flight_len(), 1);

        recorder.on_responded(id, 200, 12.5);
        assert_eq!(recorder.in_flight_len(), 0);

        let report = recorder.report();
        assert_eq!(report.by_path["/api/v1/companies"], 1);
        assert!((report.moving_avg_latency_ms - 12.5).abs() < 1e-9);
    }

    #[test]
    fn errors_are_indexed_by_kind() {
        let recorder = recorder();
        let id = recorder.on_received("GET", "/api/v1/companies");
        recorder.on_error(id, "connection_refused", "api");

        let report = recorder.report();
        assert_eq!(report.by_error_kind["connection_refused"], 1);
        assert_eq!(report.by_service["api"], 1);
        assert_eq!(recorder.in_flight_len(), 0);
    }

    #[test]
    fn excluded_paths_are_not_counted() {
        let recorder = recorder();
        let id = recorder.on_received("GET", "/gateway/health");
        recorder.on_responded(id, 200, 1.0);

        let report = recorder.report();
        assert!(report.by_path.is_empty());
        assert_eq!(report.completed, 0);
        assert_eq!(recorder.in_flight_len(), 0);
    }

    #[test]
    fn aborted_requests_are_removed() {
        let recorder = recorder();
        let id = recorder.on_received("GET", "/api/v1/companies");
        recorder.on_aborted(id);
        assert_eq!(recorder.in_flight_len(), 0);
    }
}
