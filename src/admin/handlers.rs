//! Ops endpoint handlers: status, statistics, on-demand health checks.

use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::proxy::StatsReport;
use crate::telemetry::TelemetryReport;

#[derive(Serialize)]
pub struct GatewayStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: Vec<String>,
    pub current_api_version: String,
    pub default_api_version: String,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub proxy: StatsReport,
    pub telemetry: TelemetryReport,
}

pub async fn get_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    let snapshot = state.snapshot.load_full();
    let mut services: Vec<String> = snapshot
        .registry
        .list_service_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    services.sort();

    Json(GatewayStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        services,
        current_api_version: snapshot.registry.policy().current.clone(),
        default_api_version: snapshot.registry.policy().default.clone(),
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        proxy: state.proxy.get_stats(),
        telemetry: state.telemetry.report(),
    })
}

pub async fn get_health(State(state): State<AppState>) -> Json<HashMap<String, bool>> {
    let snapshot = state.snapshot.load_full();
    let results = state.proxy.perform_health_checks(&snapshot.registry).await;
    Json(results)
}
