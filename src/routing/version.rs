//! API version resolution.
//!
//! # Responsibilities
//! - Derive the effective version for a request from header, path, query,
//!   or the configured default, in that strict priority order
//! - Normalize version tokens (`2` -> `v2`, `2.1.0` -> `v2`, `v2` passes)
//!
//! # Design Decisions
//! - The resolver never fails: an unusable token falls through to the next
//!   source, and the default version is the terminal fallback
//!   (availability over strictness)

use axum::http::HeaderMap;

use crate::config::schema::NegotiationConfig;
use crate::registry::VersionPolicy;

/// Normalize a raw version token to the canonical `vN` form.
///
/// Returns None for tokens that do not normalize; the caller falls through
/// to the next source.
pub fn normalize_version(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    // Already canonical: v<digits>.
    if let Some(rest) = token.strip_prefix('v').or_else(|| token.strip_prefix('V')) {
        if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            return Some(format!("v{rest}"));
        }
        return None;
    }

    // Bare integer: N -> vN.
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return Some(format!("v{token}"));
    }

    // Three-part dotted version: X.Y.Z -> vX.
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Some(format!("v{}", parts[0]));
    }

    None
}

/// Resolve the effective API version for a request.
///
/// Priority: explicit header, path segment after the API prefix, query
/// parameter, configured default. Each source is accepted only if its token
/// normalizes to a supported version.
pub fn resolve_version(
    headers: &HeaderMap,
    path: &str,
    query: Option<&str>,
    negotiation: &NegotiationConfig,
    policy: &VersionPolicy,
) -> String {
    if let Some(value) = headers.get(&negotiation.version_header) {
        if let Ok(raw) = value.to_str() {
            if let Some(version) = normalize_version(raw) {
                if policy.is_supported(&version) {
                    return version;
                }
            }
        }
    }

    if let Some(version) = version_from_path(path, &negotiation.api_prefix) {
        if policy.is_supported(&version) {
            return version;
        }
    }

    if let Some(query) = query {
        if let Some(version) = version_from_query(query, &negotiation.version_query) {
            if policy.is_supported(&version) {
                return version;
            }
        }
    }

    policy.default.clone()
}

/// Extract a version from the path segment immediately after the API prefix.
///
/// The prefix only counts when it is a whole segment: `/api2/foo` does not
/// carry a path version under the `/api` prefix.
fn version_from_path(path: &str, api_prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(api_prefix)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let segment = rest.split('/').find(|s| !s.is_empty())?;
    normalize_version(segment)
}

/// Extract a version from the query string.
fn version_from_query(query: &str, param: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == param)
        .and_then(|(_, v)| normalize_version(&v))
}
