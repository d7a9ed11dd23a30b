//! Service registry: static backend service table and version policy.
//!
//! # Responsibilities
//! - Hold immutable `ServiceDescriptor`s, looked up by name
//! - Hold the `VersionPolicy` and answer supported/deprecated queries
//! - Pre-compute base URLs so the hot path never formats one
//!
//! Pure data and lookup helpers; no I/O. Built once from a validated
//! configuration and shared read-only. A reload builds a whole new registry
//! as part of a new snapshot.

use std::collections::{HashMap, HashSet};

use url::Url;

use crate::config::schema::{ServiceConfig, VersionPolicyConfig};

/// Static metadata identifying one backend service.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub health_check_path: String,
    pub timeout_ms: u64,
    pub retry_budget: u32,
    /// Pre-calculated `protocol://host:port` base.
    pub base_url: Url,
}

/// API version policy with fast membership checks.
#[derive(Debug, Clone)]
pub struct VersionPolicy {
    pub current: String,
    pub default: String,
    /// Release order preserved for the stats/status endpoints.
    pub supported: Vec<String>,
    supported_set: HashSet<String>,
    deprecated: HashSet<String>,
    sunset: HashSet<String>,
}

impl VersionPolicy {
    pub fn from_config(config: &VersionPolicyConfig) -> Self {
        Self {
            current: config.current.clone(),
            default: config.default.clone(),
            supported: config.supported.clone(),
            supported_set: config.supported.iter().cloned().collect(),
            deprecated: config.deprecated.iter().cloned().collect(),
            sunset: config.sunset.iter().cloned().collect(),
        }
    }

    /// A version is routable when supported and not sunset.
    pub fn is_supported(&self, version: &str) -> bool {
        self.supported_set.contains(version) && !self.sunset.contains(version)
    }

    pub fn is_deprecated(&self, version: &str) -> bool {
        self.deprecated.contains(version)
    }
}

/// Immutable table of backend services plus the version policy.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceDescriptor>,
    policy: VersionPolicy,
}

impl ServiceRegistry {
    /// Build the registry from validated configuration.
    ///
    /// Assumes `validate_config` has already run; an unparseable base URL at
    /// this point means a host that slipped past validation, which is still
    /// a fatal startup error.
    pub fn from_config(
        services: &[ServiceConfig],
        policy: &VersionPolicyConfig,
    ) -> Result<Self, url::ParseError> {
        let mut table = HashMap::with_capacity(services.len());
        for svc in services {
            let base_url = Url::parse(&format!("{}://{}:{}", svc.protocol, svc.host, svc.port))?;
            table.insert(
                svc.name.clone(),
                ServiceDescriptor {
                    name: svc.name.clone(),
                    host: svc.host.clone(),
                    port: svc.port,
                    protocol: svc.protocol.clone(),
                    health_check_path: svc.health_check_path.clone(),
                    timeout_ms: svc.timeout_ms,
                    retry_budget: svc.retry_budget,
                    base_url,
                },
            );
        }
        Ok(Self {
            services: table,
            policy: VersionPolicy::from_config(policy),
        })
    }

    /// Look up a service by name.
    pub fn describe_service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Base URL for a service, or None if unknown.
    pub fn service_base_url(&self, name: &str) -> Option<&Url> {
        self.services.get(name).map(|d| &d.base_url)
    }

    /// All registered service names.
    pub fn list_service_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn all_services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    pub fn policy(&self) -> &VersionPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    fn config() -> (Vec<ServiceConfig>, VersionPolicyConfig) {
        let services = vec![ServiceConfig {
            name: "api".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            protocol: "http".to_string(),
            health_check_path: "/health".to_string(),
            timeout_ms: 30_000,
            retry_budget: 0,
        }];
        (services, VersionPolicyConfig::default())
    }

    #[test]
    fn lookup_and_base_url() {
        let (services, policy) = config();
        let registry = ServiceRegistry::from_config(&services, &policy).unwrap();

        let desc = registry.describe_service("api").unwrap();
        assert_eq!(desc.port, 3000);
        assert_eq!(
            registry.service_base_url("api").unwrap().as_str(),
            "http://127.0.0.1:3000/"
        );
        assert!(registry.describe_service("ghost").is_none());
        assert_eq!(registry.list_service_names(), vec!["api"]);
    }

    #[test]
    fn sunset_versions_are_not_supported() {
        let (services, mut policy) = config();
        policy.supported.push("v0".to_string());
        policy.sunset.push("v0".to_string());
        let registry = ServiceRegistry::from_config(&services, &policy).unwrap();

        assert!(registry.policy().is_supported("v1"));
        assert!(!registry.policy().is_supported("v0"));
        assert!(!registry.policy().is_supported("v9"));
    }
}
