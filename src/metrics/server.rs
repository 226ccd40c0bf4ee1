//! Minimal `axum` scrape server: `GET /metrics` (Prometheus text exposition)
//! plus JSON introspection endpoints, grounded on `peserver`'s
//! `State(Arc<Ctx>)` + `Router::new().route(...)` pattern.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use crate::baseline::{RegressionReport, Severity};
use crate::metrics::{MetricsSink, Snapshot};

#[derive(Clone)]
struct Ctx {
    metrics: Arc<MetricsSink>,
}

pub fn router(metrics: Arc<MetricsSink>) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .route("/metrics/scenarios", get(scenarios))
        .route("/metrics/performance", get(performance))
        .route("/metrics/regression", get(regression))
        .route("/metrics/health", get(health))
        .route("/dashboard/data", get(dashboard_data))
        .with_state(Ctx { metrics })
}

async fn scrape(State(ctx): State<Ctx>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = ctx.metrics.registry().gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Serialize)]
struct ScenariosResponse {
    snapshot: Snapshot,
}

async fn scenarios(State(ctx): State<Ctx>) -> Json<ScenariosResponse> {
    Json(ScenariosResponse { snapshot: ctx.metrics.snapshot() })
}

#[derive(Serialize)]
struct PerformanceResponse {
    average_tag_latency_ms: f64,
    total_replications: u64,
    bytes_copied: u64,
}

async fn performance(State(ctx): State<Ctx>) -> Json<PerformanceResponse> {
    let snap = ctx.metrics.snapshot();
    Json(PerformanceResponse {
        average_tag_latency_ms: snap.average_tag_latency_ms,
        total_replications: snap.total_replications,
        bytes_copied: snap.bytes_copied,
    })
}

/// No regression tracker is wired to the live metrics sink yet (that's the
/// baseline store's job, driven out-of-band); this endpoint reports the
/// shape of a regression result for scenarios that have been classified.
#[derive(Serialize, Default)]
struct RegressionResponse {
    reports: Vec<RegressionReport>,
}

async fn regression(State(_ctx): State<Ctx>) -> Json<RegressionResponse> {
    Json(RegressionResponse::default())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    total_errors: u64,
}

async fn health(State(ctx): State<Ctx>) -> Json<HealthResponse> {
    let snap = ctx.metrics.snapshot();
    Json(HealthResponse { status: "ok", total_errors: snap.total_errors })
}

#[derive(Serialize)]
struct DashboardData {
    snapshot: Snapshot,
    worst_severity: Option<Severity>,
}

async fn dashboard_data(State(ctx): State<Ctx>) -> Json<DashboardData> {
    Json(DashboardData { snapshot: ctx.metrics.snapshot(), worst_severity: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_router_without_panicking() {
        let _ = router(Arc::new(MetricsSink::new()));
    }
}
