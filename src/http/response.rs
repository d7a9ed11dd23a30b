//! Gateway response construction.
//!
//! # Responsibilities
//! - Build structured JSON error bodies (service, timestamp, correlation id)
//! - Add the gateway's informational headers without clobbering backend ones
//!
//! Transport failures are the only error class visible to the caller, and
//! always as structured JSON, never a raw stack trace.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use crate::routing::ResolvedRoute;

pub const HEADER_TARGET: &str = "x-gateway-target";
pub const HEADER_SERVICE: &str = "x-gateway-service";
pub const HEADER_VERSION: &str = "x-api-version";
pub const HEADER_CORRELATION_ID: &str = "x-correlation-id";
pub const HEADER_DEPRECATION: &str = "deprecation";

/// JSON error body for a failed forward.
pub fn error_response(
    status: StatusCode,
    message: &str,
    service: &str,
    correlation_id: u64,
) -> Response<Body> {
    let body = serde_json::json!({
        "error": message,
        "service": service,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "correlation_id": correlation_id,
    });
    let mut response = (status, Json(body)).into_response();
    insert_if_absent(
        response.headers_mut(),
        HEADER_CORRELATION_ID,
        &correlation_id.to_string(),
    );
    response
}

/// JSON body for a resolution miss. Not an upstream error: the gateway is
/// the terminal handler in this chain, so the miss surfaces as a 404.
pub fn no_route_response(path: &str, correlation_id: u64) -> Response<Body> {
    let body = serde_json::json!({
        "error": "no matching route",
        "path": path,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "correlation_id": correlation_id,
    });
    let mut response = (StatusCode::NOT_FOUND, Json(body)).into_response();
    insert_if_absent(
        response.headers_mut(),
        HEADER_CORRELATION_ID,
        &correlation_id.to_string(),
    );
    response
}

/// Attach the gateway's informational headers to a backend response.
///
/// Headers already set by the backend are left untouched.
pub fn add_gateway_headers(
    response: &mut Response<Body>,
    route: &ResolvedRoute,
    correlation_id: u64,
) {
    let headers = response.headers_mut();
    insert_if_absent(headers, HEADER_TARGET, &route.target_url);
    insert_if_absent(headers, HEADER_SERVICE, &route.target_service);
    insert_if_absent(headers, HEADER_VERSION, &route.matched_version);
    insert_if_absent(headers, HEADER_CORRELATION_ID, &correlation_id.to_string());
}

fn insert_if_absent(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if !headers.contains_key(name) {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_service_timestamp_and_correlation_id() {
        let response = error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "service unavailable",
            "persons",
            42,
        );
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[HEADER_CORRELATION_ID], "42");
    }

    #[test]
    fn backend_headers_are_never_overwritten() {
        let mut response = Response::builder()
            .header(HEADER_SERVICE, "set-by-backend")
            .body(Body::empty())
            .unwrap();

        let route = test_route();
        add_gateway_headers(&mut response, &route, 7);

        assert_eq!(response.headers()[HEADER_SERVICE], "set-by-backend");
        assert_eq!(response.headers()[HEADER_VERSION], "v1");
        assert_eq!(response.headers()[HEADER_CORRELATION_ID], "7");
    }

    fn test_route() -> ResolvedRoute {
        use crate::config::schema::RouteRuleConfig;
        use crate::routing::CompiledRule;
        use std::sync::Arc;

        let config = RouteRuleConfig {
            pattern: "/api/v1/*".to_string(),
            target_service: "api".to_string(),
            methods: Vec::new(),
            path_rewrite: Vec::new(),
            cors_policy: None,
            rate_limit_bucket: None,
            is_public: false,
            version_validation: false,
        };
        let rule = Arc::new(
            CompiledRule::compile(&config, "http://127.0.0.1:3000".to_string(), 30_000, false)
                .unwrap(),
        );
        ResolvedRoute {
            target_service: "api".to_string(),
            target_url: "http://127.0.0.1:3000/api/v1/x".to_string(),
            rewritten_path: "/api/v1/x".to_string(),
            matched_version: "v1".to_string(),
            params: Default::default(),
            is_dynamic: false,
            rule,
        }
    }
}
