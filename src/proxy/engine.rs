//! Request forwarding.
//!
//! # Responsibilities
//! - Own one pooled outbound client per target service, created on first
//!   use and reused for every later request to that service
//! - Forward method, headers, and exact body bytes to the resolved target
//! - Stream the backend response back untouched
//! - Map transport failures to 503/504/502
//! - Probe service health paths on demand
//!
//! # Design Decisions
//! - Pool creation goes through the DashMap entry API, so concurrent first
//!   requests to one service retain a single client
//! - Bodies are forwarded only for methods that semantically carry one
//!   (POST/PUT/PATCH); read methods send an empty body
//! - No retries here: retry budgets belong to callers

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use dashmap::DashMap;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::registry::ServiceRegistry;
use crate::routing::ResolvedRoute;
use crate::telemetry::metrics;

use super::stats::{StatsRegistry, StatsReport};

/// How a forward attempt failed, mapped to the status the caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused or unreachable.
    Unavailable,
    /// The per-service deadline elapsed.
    Timeout,
    /// Any other transport failure (reset, protocol error).
    Transport,
}

impl FailureKind {
    pub fn status(self) -> StatusCode {
        match self {
            FailureKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FailureKind::Transport => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            FailureKind::Unavailable => "service unavailable",
            FailureKind::Timeout => "gateway timeout",
            FailureKind::Transport => "bad gateway",
        }
    }

    /// Stable key for error-kind counters.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Unavailable => "connection_refused",
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
        }
    }
}

/// A failed forward, carrying the failing service for the error body.
#[derive(Debug, thiserror::Error)]
#[error("forward to `{service}` failed ({}): {message}", .kind.as_str())]
pub struct ProxyError {
    pub kind: FailureKind,
    pub service: String,
    pub message: String,
}

/// Forwards requests to backend services over pooled connections.
pub struct ProxyEngine {
    clients: DashMap<String, Client<HttpConnector, Body>>,
    stats: StatsRegistry,
    health_timeout: Duration,
}

impl ProxyEngine {
    pub fn new(health_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            stats: StatsRegistry::default(),
            health_timeout,
        }
    }

    /// The pooled client for a service, created on first use.
    fn client_for(&self, service: &str) -> Client<HttpConnector, Body> {
        self.clients
            .entry(service.to_string())
            .or_insert_with(|| Client::builder(TokioExecutor::new()).build(HttpConnector::new()))
            .clone()
    }

    /// Number of retained connection pools.
    pub fn pool_count(&self) -> usize {
        self.clients.len()
    }

    /// Forward a request to its resolved target and stream the response back.
    ///
    /// `parts` are the inbound request parts (headers preserved verbatim,
    /// cookies included); `body` is the inbound body, passed through
    /// unread for methods that carry one.
    pub async fn forward(
        &self,
        parts: &axum::http::request::Parts,
        body: Body,
        route: &ResolvedRoute,
    ) -> Result<Response<Body>, ProxyError> {
        let service = route.target_service.as_str();
        let client = self.client_for(service);

        let uri = build_target_uri(route, parts.uri.query()).map_err(|e| ProxyError {
            kind: FailureKind::Transport,
            service: service.to_string(),
            message: e,
        })?;

        let outbound_body = if carries_body(&parts.method) {
            body
        } else {
            Body::empty()
        };

        let mut builder = Request::builder()
            .method(parts.method.clone())
            .version(parts.version)
            .uri(uri);
        if let Some(headers) = builder.headers_mut() {
            copy_request_headers(&parts.headers, headers);
        }
        let request = builder.body(outbound_body).map_err(|e| ProxyError {
            kind: FailureKind::Transport,
            service: service.to_string(),
            message: e.to_string(),
        })?;

        let deadline = Duration::from_millis(route.rule.timeout_ms);
        let start = Instant::now();
        let method = parts.method.to_string();

        let outcome = tokio::time::timeout(deadline, client.request(request)).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(Ok(response)) => {
                let status = response.status();
                self.stats
                    .record(service, elapsed_ms, status.is_server_error());
                metrics::record_request(&method, status.as_u16(), service, start);

                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Ok(Err(e)) => {
                let kind = if e.is_connect() {
                    FailureKind::Unavailable
                } else {
                    FailureKind::Transport
                };
                self.stats.record(service, elapsed_ms, true);
                metrics::record_request(&method, kind.status().as_u16(), service, start);
                Err(ProxyError {
                    kind,
                    service: service.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                self.stats.record(service, elapsed_ms, true);
                metrics::record_request(&method, 504, service, start);
                Err(ProxyError {
                    kind: FailureKind::Timeout,
                    service: service.to_string(),
                    message: format!("no response within {}ms", deadline.as_millis()),
                })
            }
        }
    }

    /// Probe every registered service's health path.
    ///
    /// A failed or timed-out probe is recorded as unhealthy, never raised.
    pub async fn perform_health_checks(
        &self,
        registry: &ServiceRegistry,
    ) -> std::collections::HashMap<String, bool> {
        let mut results = std::collections::HashMap::new();

        for descriptor in registry.all_services() {
            let client = self.client_for(&descriptor.name);
            let uri_string = format!(
                "{}://{}:{}{}",
                descriptor.protocol, descriptor.host, descriptor.port, descriptor.health_check_path
            );

            let healthy = match uri_string.parse::<Uri>() {
                Ok(uri) => {
                    let request = Request::builder()
                        .method(Method::GET)
                        .uri(uri)
                        .header("user-agent", "api-gateway-health-check")
                        .body(Body::empty());
                    match request {
                        Ok(request) => {
                            match tokio::time::timeout(self.health_timeout, client.request(request))
                                .await
                            {
                                Ok(Ok(response)) => {
                                    let ok = response.status().is_success();
                                    if !ok {
                                        tracing::warn!(
                                            service = %descriptor.name,
                                            status = %response.status(),
                                            "Health check failed: non-success status"
                                        );
                                    }
                                    ok
                                }
                                Ok(Err(e)) => {
                                    tracing::warn!(
                                        service = %descriptor.name,
                                        error = %e,
                                        "Health check failed: connection error"
                                    );
                                    false
                                }
                                Err(_) => {
                                    tracing::warn!(
                                        service = %descriptor.name,
                                        "Health check failed: timeout"
                                    );
                                    false
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                service = %descriptor.name,
                                error = %e,
                                "Failed to build health check request"
                            );
                            false
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        service = %descriptor.name,
                        error = %e,
                        "Invalid health check URI"
                    );
                    false
                }
            };

            metrics::record_service_health(&descriptor.name, healthy);
            results.insert(descriptor.name.clone(), healthy);
        }

        results
    }

    /// Point-in-time statistics for every service plus the global aggregate.
    pub fn get_stats(&self) -> StatsReport {
        self.stats.snapshot()
    }
}

/// Only create/update/partial-update methods forward a body.
fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Copy inbound headers verbatim. Repeated names (Cookie, Via) are legal
/// and must all reach the backend, so this appends rather than inserts.
fn copy_request_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (name, value) in src {
        dst.append(name.clone(), value.clone());
    }
}

fn build_target_uri(route: &ResolvedRoute, query: Option<&str>) -> Result<Uri, String> {
    let uri_string = match query {
        Some(q) => format!("{}{}?{}", route.rule.authority, route.rewritten_path, q),
        None => format!("{}{}", route.rule.authority, route.rewritten_path),
    };
    uri_string.parse().map_err(|e| format!("{e}: {uri_string}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_status_mapping() {
        assert_eq!(
            FailureKind::Unavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(FailureKind::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(FailureKind::Transport.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn body_forwarding_by_method() {
        assert!(carries_body(&Method::POST));
        assert!(carries_body(&Method::PUT));
        assert!(carries_body(&Method::PATCH));
        assert!(!carries_body(&Method::GET));
        assert!(!carries_body(&Method::HEAD));
        assert!(!carries_body(&Method::DELETE));
    }

    #[test]
    fn repeated_header_names_are_all_copied() {
        let mut src = HeaderMap::new();
        src.append("cookie", "session=abc".parse().unwrap());
        src.append("cookie", "theme=dark".parse().unwrap());
        src.append("via", "1.1 edge".parse().unwrap());

        let mut dst = HeaderMap::new();
        copy_request_headers(&src, &mut dst);

        assert_eq!(dst.get_all("cookie").iter().count(), 2);
        assert_eq!(dst.get_all("via").iter().count(), 1);
        assert_eq!(dst.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_first_use_retains_one_pool() {
        let engine = std::sync::Arc::new(ProxyEngine::new(Duration::from_secs(5)));
        let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = std::sync::Arc::clone(&engine);
            let barrier = std::sync::Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                let _ = engine.client_for("persons");
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(engine.pool_count(), 1);
    }
}
