use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::state::AppState;

use super::records_per_second;

/// POST `/stop-job/:job_id`: cancel by external id and publish the stop
/// mark so other replicas observe it.
pub(crate) async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Json<Value> {
    let stopped = state.engine.stop_job(&job_id).await;
    Json(json!({ "success": true, "jobId": job_id, "stopped": stopped }))
}

/// POST `/kill/:request_id`: cancel by internal id.
pub(crate) async fn kill(
    State(state): State<AppState>,
    Path(request_id): Path<u64>,
) -> Json<Value> {
    let killed = state.engine.cancel_request(request_id);
    Json(json!({ "success": true, "requestId": request_id, "killed": killed }))
}

/// POST `/kill-all`: cancel every active job.
pub(crate) async fn kill_all(State(state): State<AppState>) -> Json<Value> {
    let killed = state.engine.cancel_all();
    Json(json!({ "success": true, "killed": killed }))
}

/// GET `/requests`: active job listing.
pub(crate) async fn requests(State(state): State<AppState>) -> Json<Value> {
    let jobs = state.engine.jobs();
    Json(json!({
        "success": true,
        "activeRequests": jobs.len(),
        "requests": jobs,
    }))
}

/// GET `/pool-stats`: worker pool gauges.
pub(crate) async fn pool_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "pool": state.engine.pool_stats() }))
}

/// GET `/metrics`: counters, pool and cache state.
pub(crate) async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let counters = state.engine.counters();
    let average_rate = records_per_second(
        counters.total_generated,
        std::time::Duration::from_millis(counters.total_duration_ms.max(1)),
    );
    Json(json!({
        "success": true,
        "counters": counters,
        "averageRecordsPerSecond": average_rate,
        "activeRequests": state.engine.active_jobs(),
        "pool": state.engine.pool_stats(),
        "caches": state.engine.preparer().stats(),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

/// GET `/health`: public liveness summary.
pub(crate) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

/// GET `/ready`: stops reporting ready once shutdown begins.
pub(crate) async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.engine.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "shutting_down" })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    }
}

/// GET `/live`: unconditional.
pub(crate) async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

/// POST `/gc`: drop expired cache entries.
pub(crate) async fn gc(State(state): State<AppState>) -> Json<Value> {
    let purged = state.engine.preparer().purge_expired();
    Json(json!({
        "success": true,
        "purgedEntries": purged,
        "caches": state.engine.preparer().stats(),
    }))
}

/// POST `/clear-cache`: drop both caches entirely.
pub(crate) async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    state.engine.preparer().clear();
    Json(json!({ "success": true, "cleared": true }))
}
