//! Configuration: schema, loading, validation, and hot reload.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CorsPolicyConfig, GatewayConfig, HealthCheckConfig, ListenerConfig, NegotiationConfig,
    ObservabilityConfig, RateLimitBucketConfig, RouteRuleConfig, ServiceConfig, TelemetryConfig,
    TimeoutConfig, VersionPolicyConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
