//! Per-service and aggregate request statistics.
//!
//! # Responsibilities
//! - Track request/error counts and a moving-average latency per service
//! - Maintain a global aggregate alongside the per-service entries
//!
//! # Design Decisions
//! - Counters are atomics; the mean is a read-modify-write pair and lives
//!   behind its own mutex so concurrent recordings never lose updates
//! - Counters are bumped before the mean, and readers get eventual, not
//!   strict, consistency

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Default)]
struct LatencyMean {
    count: u64,
    avg_ms: f64,
}

/// Live statistics for one service (or the global aggregate).
#[derive(Debug, Default)]
pub struct ServiceStats {
    request_count: AtomicU64,
    error_count: AtomicU64,
    last_request_at_ms: AtomicU64,
    latency: Mutex<LatencyMean>,
}

impl ServiceStats {
    /// Record one completed forward.
    pub fn record(&self, duration_ms: f64, is_error: bool) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.last_request_at_ms.store(now_ms(), Ordering::Relaxed);

        let mut latency = self
            .latency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        latency.count += 1;
        // Incremental mean: avg' = avg + (sample - avg) / n.
        latency.avg_ms += (duration_ms - latency.avg_ms) / latency.count as f64;
    }

    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        let latency = self
            .latency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let last = self.last_request_at_ms.load(Ordering::Relaxed);
        ServiceStatsSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            moving_avg_latency_ms: latency.avg_ms,
            last_request_at_ms: (last != 0).then_some(last),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Point-in-time view of one service's statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub moving_avg_latency_ms: f64,
    pub last_request_at_ms: Option<u64>,
}

/// All per-service statistics plus the global aggregate.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    services: DashMap<String, Arc<ServiceStats>>,
    global: ServiceStats,
}

impl StatsRegistry {
    pub fn record(&self, service: &str, duration_ms: f64, is_error: bool) {
        let entry = self
            .services
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(ServiceStats::default()))
            .clone();
        entry.record(duration_ms, is_error);
        self.global.record(duration_ms, is_error);
    }

    pub fn snapshot(&self) -> StatsReport {
        let mut services = BTreeMap::new();
        for entry in self.services.iter() {
            services.insert(entry.key().clone(), entry.value().snapshot());
        }
        StatsReport {
            global: self.global.snapshot(),
            services,
        }
    }
}

/// Serializable report for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub global: ServiceStatsSnapshot,
    pub services: BTreeMap<String, ServiceStatsSnapshot>,
}
