//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend service definitions.
    pub services: Vec<ServiceConfig>,

    /// API version policy (current, default, supported, deprecated, sunset).
    pub versions: VersionPolicyConfig,

    /// Static route rules, grouped by the version they are scoped to.
    /// Order within a version is significant: first match wins.
    pub static_routes: BTreeMap<String, Vec<RouteRuleConfig>>,

    /// Dynamic route rules (patterns containing a `:version` placeholder),
    /// evaluated only after every static rule for the resolved version missed.
    pub dynamic_routes: Vec<RouteRuleConfig>,

    /// Version negotiation knobs (header/query names, path prefix).
    pub negotiation: NegotiationConfig,

    /// Legacy path redirects (`old path -> new path`), consumed by the
    /// redirect collaborator in front of the router.
    pub legacy_redirects: BTreeMap<String, String>,

    /// Named CORS policies that rules reference via `cors_policy`.
    pub cors_policies: BTreeMap<String, CorsPolicyConfig>,

    /// Named rate-limit buckets that rules reference via `rate_limit_bucket`.
    pub rate_limits: BTreeMap<String, RateLimitBucketConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Telemetry recorder settings (event log sink, exclusions).
    pub telemetry: TelemetryConfig,

    /// Observability settings (log level, prometheus exporter).
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One backend service reachable through the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service name; route rules reference this.
    pub name: String,

    /// Backend host (name or address).
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Scheme used for outbound calls ("http" unless fronted by TLS).
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Path probed by health checks.
    #[serde(default = "default_health_path")]
    pub health_check_path: String,

    /// Per-request outbound timeout in milliseconds.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry budget advertised to callers. The gateway itself never retries;
    /// this is configuration data for clients that do.
    #[serde(default)]
    pub retry_budget: u32,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_service_timeout_ms() -> u64 {
    30_000
}

/// API version policy.
///
/// Invariant (enforced by validation): `current` and `default` must be
/// members of `supported`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VersionPolicyConfig {
    /// The newest published version.
    pub current: String,

    /// Version assumed when a request carries no usable version token.
    pub default: String,

    /// All versions the gateway will route, in release order.
    pub supported: Vec<String>,

    /// Versions still routed but flagged for removal.
    pub deprecated: Vec<String>,

    /// Versions no longer routed; the resolver treats them as unsupported.
    pub sunset: Vec<String>,
}

impl Default for VersionPolicyConfig {
    fn default() -> Self {
        Self {
            current: "v2".to_string(),
            default: "v1".to_string(),
            supported: vec!["v1".to_string(), "v2".to_string()],
            deprecated: Vec::new(),
            sunset: Vec::new(),
        }
    }
}

/// A single route rule: path template, target, rewrite steps, policy flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteRuleConfig {
    /// Path template: literal segments, `:name` parameters, trailing `*`.
    pub pattern: String,

    /// Name of the service this rule forwards to.
    pub target_service: String,

    /// Allowed methods; empty means all methods.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Ordered `(match_expr, replacement)` regex substitutions applied to
    /// the matched path before forwarding.
    #[serde(default)]
    pub path_rewrite: Vec<(String, String)>,

    /// CORS policy name, consumed by the CORS middleware collaborator.
    #[serde(default)]
    pub cors_policy: Option<String>,

    /// Rate-limit bucket name, consumed by the rate-limit collaborator.
    #[serde(default)]
    pub rate_limit_bucket: Option<String>,

    /// Public rules skip the authentication middleware.
    #[serde(default)]
    pub is_public: bool,

    /// For dynamic rules: reject the match if the captured `:version` is
    /// not in the supported set.
    #[serde(default)]
    pub version_validation: bool,
}

/// A named CORS policy. The gateway carries these for the CORS middleware
/// collaborator; it does not evaluate them itself.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsPolicyConfig {
    /// Origins allowed to call; `*` allows any.
    pub allowed_origins: Vec<String>,

    /// Methods allowed cross-origin; empty means all.
    pub allowed_methods: Vec<String>,

    /// Request headers allowed cross-origin; empty means all.
    pub allowed_headers: Vec<String>,

    /// Whether credentialed requests are allowed.
    pub allow_credentials: bool,

    /// How long preflight results may be cached, in seconds.
    pub max_age_secs: u64,
}

/// A named rate-limit bucket. Carried for the rate-limit collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitBucketConfig {
    /// Requests admitted per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitBucketConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
        }
    }
}

/// Where the resolver looks for a version token, and the path prefix that
/// precedes an embedded version segment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Header carrying an explicit version (highest priority).
    pub version_header: String,

    /// Query parameter carrying a version (lowest explicit priority).
    pub version_query: String,

    /// Fixed prefix before an embedded version segment, e.g. "/api" so that
    /// "/api/v2/foo" resolves v2 from the path.
    pub api_prefix: String,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            version_header: "x-api-version".to_string(),
            version_query: "api-version".to_string(),
            api_prefix: "/api".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Probe timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

/// Telemetry recorder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Path of the JSON-lines event log; None disables the file sink.
    pub log_path: Option<String>,

    /// Rotate the log once it exceeds this many bytes.
    pub max_log_bytes: u64,

    /// Request paths never logged (health probes, metrics scrapes).
    pub excluded_paths: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            max_log_bytes: 10 * 1024 * 1024,
            excluded_paths: vec![
                "/gateway/health".to_string(),
                "/gateway/stats".to_string(),
                "/gateway/status".to_string(),
            ],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
