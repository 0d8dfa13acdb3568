use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use dataforge_engine::Mode;

use crate::error::ApiError;
use crate::state::AppState;

use super::records_per_second;

const DEFAULT_ITERATIONS: u32 = 5;
const MAX_ITERATIONS: u32 = 100;
const DEFAULT_RECORDS: u64 = 1_000;
const MAX_RECORDS: u64 = 100_000;

/// The fixed benchmark schema: a typical flat entity with a couple of
/// formats and bounds, so runs stay comparable across versions.
fn bench_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "name": { "type": "string" },
            "email": { "type": "string", "format": "email" },
            "age": { "type": "integer", "minimum": 18, "maximum": 99 },
            "active": { "type": "boolean" }
        },
        "required": ["id", "name", "email"]
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BenchmarkRequest {
    iterations: Option<u32>,
    count: Option<u64>,
}

/// POST `/benchmark`: run N generation iterations over the fixed schema.
pub(crate) async fn benchmark(
    State(state): State<AppState>,
    body: Option<Json<BenchmarkRequest>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let iterations = body
        .iterations
        .unwrap_or(DEFAULT_ITERATIONS)
        .clamp(1, MAX_ITERATIONS);
    let count = body.count.unwrap_or(DEFAULT_RECORDS).clamp(1, MAX_RECORDS);

    let prepared = state.engine.preparer().prepare(&bench_schema(), Mode::Strict);

    let started = Instant::now();
    let mut iteration_ms = Vec::with_capacity(iterations as usize);
    for _ in 0..iterations {
        let token = CancellationToken::new();
        let iteration_started = Instant::now();
        state
            .engine
            .generate(prepared.clone(), count, false, &token)
            .await
            .map_err(|err| ApiError::generation(err.to_string()))?;
        iteration_ms.push(iteration_started.elapsed().as_millis() as u64);
    }

    let elapsed = started.elapsed();
    let total_records = count * iterations as u64;
    Ok(Json(json!({
        "success": true,
        "iterations": iterations,
        "recordsPerIteration": count,
        "totalRecords": total_records,
        "durationMs": elapsed.as_millis() as u64,
        "recordsPerSecond": records_per_second(total_records, elapsed),
        "iterationMs": iteration_ms,
    })))
}
