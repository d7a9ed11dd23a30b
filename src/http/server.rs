//! HTTP server setup and the gateway request handler.
//!
//! # Responsibilities
//! - Build the Axum router (ops endpoints + catch-all gateway handler)
//! - Wire up middleware (timeout, tracing)
//! - Hold the immutable configuration snapshot behind an atomic swap
//! - Apply validated config updates as whole-snapshot swaps
//! - Dispatch requests: version resolution, route resolution, forwarding,
//!   telemetry correlation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::schema::{GatewayConfig, NegotiationConfig};
use crate::http::response::{
    add_gateway_headers, error_response, no_route_response, HEADER_DEPRECATION,
};
use crate::proxy::ProxyEngine;
use crate::registry::ServiceRegistry;
use crate::routing::{resolve_version, RouteBuildError, RouteTable};
use crate::telemetry::TelemetryRecorder;

/// Fatal error while building a configuration snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid service address: {0}")]
    Registry(#[from] url::ParseError),

    #[error(transparent)]
    Routes(#[from] RouteBuildError),
}

/// Immutable view of one validated configuration.
///
/// Built once at startup and rebuilt wholesale on reload; the running
/// system only ever swaps the Arc, never mutates a snapshot in place.
pub struct GatewaySnapshot {
    pub registry: ServiceRegistry,
    pub routes: RouteTable,
    pub negotiation: NegotiationConfig,
}

impl GatewaySnapshot {
    pub fn build(config: &GatewayConfig) -> Result<Self, StartupError> {
        let registry = ServiceRegistry::from_config(&config.services, &config.versions)?;
        let routes = RouteTable::from_config(config, &registry)?;
        Ok(Self {
            registry,
            routes,
            negotiation: config.negotiation.clone(),
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<ArcSwap<GatewaySnapshot>>,
    pub proxy: Arc<ProxyEngine>,
    pub telemetry: Arc<TelemetryRecorder>,
}

/// HTTP server for the API gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Snapshot construction failures here are fatal startup errors.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let snapshot = GatewaySnapshot::build(&config)?;

        let state = AppState {
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            proxy: Arc::new(ProxyEngine::new(Duration::from_secs(
                config.health_check.timeout_secs,
            ))),
            telemetry: Arc::new(TelemetryRecorder::new(&config.telemetry)),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/gateway/status", get(admin::get_status))
            .route("/gateway/stats", get(admin::get_stats))
            .route("/gateway/health", get(admin::get_health))
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// `config_updates` carries already-validated configs from the watcher;
    /// each one is built into a fresh snapshot and atomically swapped in.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                match GatewaySnapshot::build(&new_config) {
                    Ok(snapshot) => {
                        state.snapshot.store(Arc::new(snapshot));
                        tracing::info!("Configuration snapshot swapped");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected config update, keeping current snapshot");
                    }
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handle to the shared state (snapshot, proxy engine, telemetry).
    pub fn state(&self) -> AppState {
        self.state.clone()
    }
}

/// Removes the in-flight trace if the handler future is dropped before a
/// response is produced (caller disconnect).
struct TraceGuard {
    telemetry: Arc<TelemetryRecorder>,
    request_id: u64,
    armed: bool,
}

impl TraceGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        if self.armed {
            self.telemetry.on_aborted(self.request_id);
        }
    }
}

/// Main gateway handler.
/// Resolves version and route, forwards, and correlates telemetry.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let request_id = state.telemetry.on_received(parts.method.as_str(), &path);
    let mut guard = TraceGuard {
        telemetry: Arc::clone(&state.telemetry),
        request_id,
        armed: true,
    };

    let snapshot = state.snapshot.load_full();
    let policy = snapshot.registry.policy();

    let version = resolve_version(
        &parts.headers,
        &path,
        parts.uri.query(),
        &snapshot.negotiation,
        policy,
    );

    let Some(route) = snapshot.routes.resolve(&parts.method, &path, &version, policy) else {
        tracing::debug!(request_id, path = %path, version = %version, "No route matched");
        guard.disarm();
        state
            .telemetry
            .on_responded(request_id, 404, elapsed_ms(start));
        return no_route_response(&path, request_id);
    };

    state.telemetry.on_routed(request_id, &route);

    let deprecated = policy.is_deprecated(&route.matched_version);
    if deprecated {
        tracing::warn!(
            request_id,
            version = %route.matched_version,
            "Request uses a deprecated API version"
        );
    }

    match state.proxy.forward(&parts, body, &route).await {
        Ok(mut response) => {
            add_gateway_headers(&mut response, &route, request_id);
            if deprecated && !response.headers().contains_key(HEADER_DEPRECATION) {
                if let Ok(value) = "true".parse() {
                    response.headers_mut().insert(HEADER_DEPRECATION, value);
                }
            }
            guard.disarm();
            state.telemetry.on_responded(
                request_id,
                response.status().as_u16(),
                elapsed_ms(start),
            );
            response
        }
        Err(e) => {
            guard.disarm();
            state
                .telemetry
                .on_error(request_id, e.kind.as_str(), &e.service);
            error_response(e.kind.status(), e.kind.message(), &e.service, request_id)
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
