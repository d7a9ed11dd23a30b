//! Route rule compilation and matching.
//!
//! # Responsibilities
//! - Compile path templates (literal segments, `:name` parameters, trailing
//!   `*`) to anchored regexes
//! - Match a path against a compiled rule and extract parameters positionally
//!
//! # Design Decisions
//! - Templates compile once at snapshot build time; the hot path only runs
//!   pre-compiled regexes
//! - A trailing `*` captures zero or more segments, so `/api/v1/*` also
//!   matches `/api/v1`
//! - Method filter: an empty method set matches all methods

use std::collections::{HashMap, HashSet};

use axum::http::Method;
use regex::Regex;

use crate::config::schema::RouteRuleConfig;

/// Error from compiling a route rule.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("pattern `{pattern}` does not compile: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("pattern `{0}` has a non-trailing wildcard")]
    NonTrailingWildcard(String),
}

/// A route rule with its template compiled to a matcher.
#[derive(Debug)]
pub struct CompiledRule {
    /// Original template, kept for logging and stats keys.
    pub pattern: String,

    /// Target service name.
    pub target_service: String,

    /// `protocol://host:port` of the target, resolved at build time.
    pub authority: String,

    /// Outbound timeout for the target service.
    pub timeout_ms: u64,

    /// Allowed methods; empty set matches everything.
    pub methods: HashSet<Method>,

    /// Ordered rewrite steps.
    pub path_rewrite: Vec<(String, String)>,

    pub cors_policy: Option<String>,
    pub rate_limit_bucket: Option<String>,
    pub is_public: bool,
    pub version_validation: bool,
    pub is_dynamic: bool,

    regex: Regex,
    /// Parameter names in capture order; wildcard captures are unnamed.
    param_names: Vec<Option<String>>,
}

impl CompiledRule {
    /// Compile a rule configuration against a resolved target authority.
    pub fn compile(
        config: &RouteRuleConfig,
        authority: String,
        timeout_ms: u64,
        is_dynamic: bool,
    ) -> Result<Self, CompileError> {
        let (pattern_src, param_names) = template_to_regex(&config.pattern)?;
        let regex = Regex::new(&pattern_src).map_err(|source| CompileError::BadPattern {
            pattern: config.pattern.clone(),
            source,
        })?;

        let methods = config
            .methods
            .iter()
            .filter_map(|m| m.to_uppercase().parse().ok())
            .collect();

        Ok(Self {
            pattern: config.pattern.clone(),
            target_service: config.target_service.clone(),
            authority,
            timeout_ms,
            methods,
            path_rewrite: config.path_rewrite.clone(),
            cors_policy: config.cors_policy.clone(),
            rate_limit_bucket: config.rate_limit_bucket.clone(),
            is_public: config.is_public,
            version_validation: config.version_validation,
            is_dynamic,
            regex,
            param_names,
        })
    }

    /// Returns true if the rule accepts this method.
    pub fn allows_method(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Match a path against the compiled template, extracting named
    /// parameters positionally. Returns None on a structural miss.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let mut params = HashMap::new();
        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(name) = name {
                if let Some(m) = captures.get(i + 1) {
                    params.insert(name.clone(), m.as_str().to_string());
                }
            }
        }
        Some(params)
    }
}

/// Convert a path template to an anchored regex source plus the capture
/// names in positional order.
fn template_to_regex(pattern: &str) -> Result<(String, Vec<Option<String>>), CompileError> {
    let mut source = String::from("^");
    let mut names = Vec::new();

    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len().saturating_sub(1);

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            if *segment == "*" {
                if i != last {
                    return Err(CompileError::NonTrailingWildcard(pattern.to_string()));
                }
                // Optional so the catch-all also matches the bare prefix.
                source.push_str("(?:/(.*))?");
                names.push(None);
                continue;
            }
            source.push('/');
        }

        if let Some(name) = segment.strip_prefix(':') {
            source.push_str("([^/]+)");
            names.push(Some(name.to_string()));
        } else {
            source.push_str(&regex::escape(segment));
        }
    }

    source.push('$');
    Ok((source, names))
}
