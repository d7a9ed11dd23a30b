//! Configuration validation.
//!
//! Semantic validation on top of serde's syntactic checks. Runs once before
//! a configuration is accepted into the system; a failure here is a fatal
//! startup (or reload-rejection) error, never a per-request one.
//!
//! Returns all validation errors, not just the first.

use std::collections::HashSet;

use crate::config::schema::{GatewayConfig, RouteRuleConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("service `{0}` has an empty host")]
    EmptyHost(String),

    #[error("service `{0}` has port 0")]
    ZeroPort(String),

    #[error("service `{0}` has unsupported protocol `{1}`")]
    BadProtocol(String, String),

    #[error("duplicate service name `{0}`")]
    DuplicateService(String),

    #[error("current version `{0}` is not in the supported set")]
    CurrentNotSupported(String),

    #[error("default version `{0}` is not in the supported set")]
    DefaultNotSupported(String),

    #[error("rule `{pattern}` targets unknown service `{service}`")]
    UnknownTarget { pattern: String, service: String },

    #[error("static rule `{pattern}` for version `{version}` contains a :version placeholder")]
    VersionPlaceholderInStatic { version: String, pattern: String },

    #[error("dynamic rule `{0}` has no :version placeholder")]
    MissingVersionPlaceholder(String),

    #[error("rule `{pattern}` has invalid rewrite expression `{expr}`: {reason}")]
    BadRewrite {
        pattern: String,
        expr: String,
        reason: String,
    },

    #[error("rule `{pattern}` references unknown CORS policy `{policy}`")]
    UnknownCorsPolicy { pattern: String, policy: String },

    #[error("rule `{pattern}` references unknown rate-limit bucket `{bucket}`")]
    UnknownRateLimitBucket { pattern: String, bucket: String },

    #[error("legacy redirect `{from}` -> `{to}` must map absolute paths")]
    BadLegacyRedirect { from: String, to: String },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut names = HashSet::new();
    for service in &config.services {
        if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }
        if service.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost(service.name.clone()));
        }
        if service.port == 0 {
            errors.push(ValidationError::ZeroPort(service.name.clone()));
        }
        if service.protocol != "http" && service.protocol != "https" {
            errors.push(ValidationError::BadProtocol(
                service.name.clone(),
                service.protocol.clone(),
            ));
        }
    }

    let policy = &config.versions;
    if !policy.supported.contains(&policy.current) {
        errors.push(ValidationError::CurrentNotSupported(policy.current.clone()));
    }
    if !policy.supported.contains(&policy.default) {
        errors.push(ValidationError::DefaultNotSupported(policy.default.clone()));
    }

    for (version, rules) in &config.static_routes {
        for rule in rules {
            if rule.pattern.split('/').any(|s| s == ":version") {
                errors.push(ValidationError::VersionPlaceholderInStatic {
                    version: version.clone(),
                    pattern: rule.pattern.clone(),
                });
            }
            check_rule(rule, config, &names, &mut errors);
        }
    }

    for rule in &config.dynamic_routes {
        if !rule.pattern.split('/').any(|s| s == ":version") {
            errors.push(ValidationError::MissingVersionPlaceholder(
                rule.pattern.clone(),
            ));
        }
        check_rule(rule, config, &names, &mut errors);
    }

    for (from, to) in &config.legacy_redirects {
        if !from.starts_with('/') || !to.starts_with('/') {
            errors.push(ValidationError::BadLegacyRedirect {
                from: from.clone(),
                to: to.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rule(
    rule: &RouteRuleConfig,
    config: &GatewayConfig,
    service_names: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) {
    if !service_names.contains(rule.target_service.as_str()) {
        errors.push(ValidationError::UnknownTarget {
            pattern: rule.pattern.clone(),
            service: rule.target_service.clone(),
        });
    }
    if let Some(policy) = &rule.cors_policy {
        if !config.cors_policies.contains_key(policy) {
            errors.push(ValidationError::UnknownCorsPolicy {
                pattern: rule.pattern.clone(),
                policy: policy.clone(),
            });
        }
    }
    if let Some(bucket) = &rule.rate_limit_bucket {
        if !config.rate_limits.contains_key(bucket) {
            errors.push(ValidationError::UnknownRateLimitBucket {
                pattern: rule.pattern.clone(),
                bucket: bucket.clone(),
            });
        }
    }
    for (expr, _) in &rule.path_rewrite {
        // Dynamic rewrite expressions get parameters substituted before
        // compilation, so only expressions without placeholders can be
        // compile-checked here.
        if !expr.contains(':') {
            if let Err(e) = regex::Regex::new(expr) {
                errors.push(ValidationError::BadRewrite {
                    pattern: rule.pattern.clone(),
                    expr: expr.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}
