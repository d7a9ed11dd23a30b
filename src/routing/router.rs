//! Route lookup.
//!
//! # Responsibilities
//! - Hold the version-scoped static rule sets and the dynamic rule set
//! - Resolve a (method, path, version) triple to a `ResolvedRoute`
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks); a config
//!   reload builds a whole new table
//! - Declaration order within a rule set is the tie-break: first match wins,
//!   no scoring
//! - Static rules always win over dynamic rules, regardless of specificity
//! - Explicit None on a miss rather than a silent default

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::config::schema::GatewayConfig;
use crate::registry::{ServiceRegistry, VersionPolicy};
use crate::routing::matcher::{CompileError, CompiledRule};
use crate::routing::rewrite::rewrite;

/// Error from building the route table.
#[derive(Debug, thiserror::Error)]
pub enum RouteBuildError {
    #[error("rule `{pattern}` targets unknown service `{service}`")]
    UnknownService { pattern: String, service: String },

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// The route selected for one request. Created by the matcher, consumed
/// once by the proxy engine, discarded after the response is sent.
#[derive(Debug)]
pub struct ResolvedRoute {
    pub target_service: String,
    pub target_url: String,
    pub rewritten_path: String,
    pub matched_version: String,
    pub params: HashMap<String, String>,
    pub is_dynamic: bool,
    pub rule: Arc<CompiledRule>,
}

/// Ordered rule sets, compiled once per configuration snapshot.
#[derive(Debug)]
pub struct RouteTable {
    static_rules: HashMap<String, Vec<Arc<CompiledRule>>>,
    dynamic_rules: Vec<Arc<CompiledRule>>,
    default_version: String,
}

impl RouteTable {
    /// Compile all rule tables against the service registry.
    pub fn from_config(
        config: &GatewayConfig,
        registry: &ServiceRegistry,
    ) -> Result<Self, RouteBuildError> {
        let mut static_rules: HashMap<String, Vec<Arc<CompiledRule>>> = HashMap::new();
        for (version, rules) in &config.static_routes {
            let mut compiled = Vec::with_capacity(rules.len());
            for rule in rules {
                compiled.push(Arc::new(compile_rule(rule, registry, false)?));
            }
            static_rules.insert(version.clone(), compiled);
        }

        let mut dynamic_rules = Vec::with_capacity(config.dynamic_routes.len());
        for rule in &config.dynamic_routes {
            dynamic_rules.push(Arc::new(compile_rule(rule, registry, true)?));
        }

        Ok(Self {
            static_rules,
            dynamic_rules,
            default_version: config.versions.default.clone(),
        })
    }

    /// Resolve a request to a route.
    ///
    /// Step 1: the static rule set for `version` (falling back to the
    /// default version's set), declaration order, first structural match.
    /// Step 2: the dynamic rules; a rule with `version_validation` rejects
    /// an unsupported captured version and the scan continues. The result
    /// of step 2 is never re-fed into step 1.
    ///
    /// None means no rule matched: a pass-through, not an error.
    pub fn resolve(
        &self,
        method: &Method,
        path: &str,
        version: &str,
        policy: &VersionPolicy,
    ) -> Option<ResolvedRoute> {
        let rules = self
            .static_rules
            .get(version)
            .or_else(|| self.static_rules.get(&self.default_version));

        if let Some(rules) = rules {
            for rule in rules {
                if !rule.allows_method(method) {
                    continue;
                }
                if let Some(params) = rule.match_path(path) {
                    return Some(self.build_route(rule, path, version.to_string(), params));
                }
            }
        }

        for rule in &self.dynamic_rules {
            if !rule.allows_method(method) {
                continue;
            }
            let Some(params) = rule.match_path(path) else {
                continue;
            };
            let captured = params.get("version").cloned();
            if rule.version_validation {
                match captured.as_deref() {
                    Some(v) if policy.is_supported(v) => {}
                    _ => continue,
                }
            }
            let matched_version = captured.unwrap_or_else(|| version.to_string());
            return Some(self.build_route(rule, path, matched_version, params));
        }

        None
    }

    fn build_route(
        &self,
        rule: &Arc<CompiledRule>,
        path: &str,
        matched_version: String,
        params: HashMap<String, String>,
    ) -> ResolvedRoute {
        let rewritten_path = rewrite(path, &rule.path_rewrite, &params);
        ResolvedRoute {
            target_service: rule.target_service.clone(),
            target_url: format!("{}{}", rule.authority, rewritten_path),
            rewritten_path,
            matched_version,
            params,
            is_dynamic: rule.is_dynamic,
            rule: Arc::clone(rule),
        }
    }
}

fn compile_rule(
    rule: &crate::config::schema::RouteRuleConfig,
    registry: &ServiceRegistry,
    is_dynamic: bool,
) -> Result<CompiledRule, RouteBuildError> {
    let descriptor = registry.describe_service(&rule.target_service).ok_or_else(|| {
        RouteBuildError::UnknownService {
            pattern: rule.pattern.clone(),
            service: rule.target_service.clone(),
        }
    })?;
    let authority = format!(
        "{}://{}:{}",
        descriptor.protocol, descriptor.host, descriptor.port
    );
    Ok(CompiledRule::compile(
        rule,
        authority,
        descriptor.timeout_ms,
        is_dynamic,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{GatewayConfig, RouteRuleConfig, ServiceConfig};

    fn rule(pattern: &str) -> RouteRuleConfig {
        RouteRuleConfig {
            pattern: pattern.to_string(),
            target_service: "api".to_string(),
            methods: Vec::new(),
            path_rewrite: Vec::new(),
            cors_policy: None,
            rate_limit_bucket: None,
            is_public: false,
            version_validation: false,
        }
    }

    fn base_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.services.push(ServiceConfig {
            name: "api".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            protocol: "http".to_string(),
            health_check_path: "/health".to_string(),
            timeout_ms: 30_000,
            retry_budget: 0,
        });
        config
    }

    fn table(config: &GatewayConfig) -> (RouteTable, VersionPolicy) {
        let registry = ServiceRegistry::from_config(&config.services, &config.versions).unwrap();
        let table = RouteTable::from_config(config, &registry).unwrap();
        let policy = registry.policy().clone();
        (table, policy)
    }

    #[test]
    fn declaration_order_wins_over_specificity() {
        let mut config = base_config();
        // Both patterns match /api/v1/companies; the first declared wins.
        config.static_routes.insert(
            "v1".to_string(),
            vec![rule("/api/v1/companies"), rule("/api/v1/*")],
        );
        let (table, policy) = table(&config);

        let route = table
            .resolve(&Method::GET, "/api/v1/companies", "v1", &policy)
            .unwrap();
        assert_eq!(route.rule.pattern, "/api/v1/companies");

        // Reversed declaration: the wildcard shadows the literal.
        let mut config = base_config();
        config.static_routes.insert(
            "v1".to_string(),
            vec![rule("/api/v1/*"), rule("/api/v1/companies")],
        );
        let (table, policy) = self::table(&config);
        let route = table
            .resolve(&Method::GET, "/api/v1/companies", "v1", &policy)
            .unwrap();
        assert_eq!(route.rule.pattern, "/api/v1/*");
    }

    #[test]
    fn unknown_version_falls_back_to_default_rule_set() {
        let mut config = base_config();
        config
            .static_routes
            .insert("v1".to_string(), vec![rule("/api/v1/*")]);
        let (table, policy) = table(&config);

        // v2 has no rule set registered; the default (v1) set is used.
        let route = table
            .resolve(&Method::GET, "/api/v1/companies", "v2", &policy)
            .unwrap();
        assert_eq!(route.matched_version, "v2");
        assert_eq!(route.target_service, "api");
    }

    #[test]
    fn static_always_wins_over_dynamic() {
        let mut config = base_config();
        config
            .static_routes
            .insert("v1".to_string(), vec![rule("/*")]);
        let mut dynamic = rule("/api/:version/persons/:id");
        dynamic.version_validation = true;
        config.dynamic_routes.push(dynamic);
        let (table, policy) = table(&config);

        let route = table
            .resolve(&Method::GET, "/api/v1/persons/42", "v1", &policy)
            .unwrap();
        assert!(!route.is_dynamic);
        assert_eq!(route.rule.pattern, "/*");
    }

    #[test]
    fn dynamic_version_validation_rejects_unsupported() {
        let mut config = base_config();
        let mut strict = rule("/api/:version/persons/:id");
        strict.version_validation = true;
        config.dynamic_routes.push(strict);
        let (table, policy) = table(&config);

        assert!(table
            .resolve(&Method::GET, "/api/v9/persons/42", "v1", &policy)
            .is_none());

        let route = table
            .resolve(&Method::GET, "/api/v2/persons/42", "v1", &policy)
            .unwrap();
        assert_eq!(route.matched_version, "v2");
        assert_eq!(route.params["id"], "42");
        assert!(route.is_dynamic);
    }

    #[test]
    fn rejected_dynamic_rule_continues_to_next() {
        let mut config = base_config();
        let mut strict = rule("/api/:version/persons/:id");
        strict.version_validation = true;
        let lax = rule("/api/:version/*");
        config.dynamic_routes.push(strict);
        config.dynamic_routes.push(lax);
        let (table, policy) = table(&config);

        let route = table
            .resolve(&Method::GET, "/api/v9/persons/42", "v1", &policy)
            .unwrap();
        assert_eq!(route.rule.pattern, "/api/:version/*");
        assert_eq!(route.matched_version, "v9");
    }

    #[test]
    fn dynamic_rewrite_substitutes_captured_version() {
        let mut config = base_config();
        let mut dynamic = rule("/api/:version/*");
        dynamic.path_rewrite = vec![("^/api/:version".to_string(), "/:version".to_string())];
        config.dynamic_routes.push(dynamic);
        let (table, policy) = table(&config);

        let route = table
            .resolve(&Method::GET, "/api/v2/foo/bar", "v1", &policy)
            .unwrap();
        assert_eq!(route.rewritten_path, "/v2/foo/bar");
        assert_eq!(route.target_url, "http://127.0.0.1:3000/v2/foo/bar");
    }

    #[test]
    fn no_match_is_none_not_error() {
        let config = base_config();
        let (table, policy) = table(&config);
        assert!(table
            .resolve(&Method::GET, "/nothing/here", "v1", &policy)
            .is_none());
    }

    #[test]
    fn method_filter_respects_declaration_order() {
        let mut config = base_config();
        let mut get_only = rule("/api/v1/*");
        get_only.methods = vec!["GET".to_string()];
        let fallback = rule("/api/v1/*");
        config
            .static_routes
            .insert("v1".to_string(), vec![get_only, fallback]);
        let (table, policy) = table(&config);

        let route = table
            .resolve(&Method::POST, "/api/v1/companies", "v1", &policy)
            .unwrap();
        assert!(route.rule.methods.is_empty());
    }
}
