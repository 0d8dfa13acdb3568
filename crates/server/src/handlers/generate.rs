use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

use super::{JobGuard, external_job_id, plan_request, records_per_second};
use dataforge_engine::Mode;

/// POST `/generate`: buffered generation, one or many schemas.
pub(crate) async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<super::GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.streaming {
        // Accepted for compatibility; the buffered endpoint still buffers.
        debug!("ignoring `streaming` flag on /generate");
    }
    let plan = plan_request(&state, body)?;
    let job_id = external_job_id(&headers);

    let (request_id, token) = state.engine.register_job(job_id.clone(), plan.total).await;
    let guard = JobGuard::new(state.engine.clone(), request_id, token.clone());

    let fuzz = plan.mode == Mode::Fuzz;
    let started = Instant::now();

    let mut outputs = Vec::with_capacity(plan.targets.len());
    for target in &plan.targets {
        let prepared = state.engine.preparer().prepare(&target.schema, plan.mode);
        let target_started = Instant::now();
        let records = state
            .engine
            .generate(prepared, target.count, fuzz, &token)
            .await
            .map_err(|err| ApiError::from_engine(err, job_id.as_deref(), request_id))?;
        outputs.push((target, records, target_started.elapsed()));
    }

    let total_generated: u64 = outputs.iter().map(|(_, records, _)| records.len() as u64).sum();
    let elapsed = started.elapsed();
    let stats = json!({
        "durationMs": elapsed.as_millis() as u64,
        "recordsPerSecond": records_per_second(total_generated, elapsed),
    });

    let response = if plan.single_untagged {
        let (target, records, _) = outputs.remove(0);
        let (valid, invalid) = if plan.validate_data {
            split_validated(&state, &records, &target.schema)
        } else {
            (records.clone(), Vec::new())
        };
        // Back-compat shape: `valid`/`invalid` shadow `results` for the
        // single-schema case. Callers depend on both being present.
        json!({
            "success": true,
            "totalRecordsGenerated": total_generated,
            "schemasProcessed": 1,
            "results": records,
            "valid": valid,
            "invalid": invalid,
            "stats": stats,
        })
    } else {
        let results: Vec<Value> = outputs
            .into_iter()
            .enumerate()
            .map(|(idx, (target, records, target_elapsed))| {
                let collection = target
                    .collection
                    .clone()
                    .unwrap_or_else(|| format!("schema_{idx}"));
                let generated = records.len() as u64;
                let mut entry = json!({
                    "collection": collection,
                    "stats": {
                        "durationMs": target_elapsed.as_millis() as u64,
                        "recordsPerSecond": records_per_second(generated, target_elapsed),
                    },
                });
                if plan.validate_data {
                    let (valid, invalid) = split_validated(&state, &records, &target.schema);
                    entry["valid"] = json!(valid);
                    entry["invalid"] = json!(invalid);
                }
                entry["data"] = Value::Array(records);
                entry
            })
            .collect();
        json!({
            "success": true,
            "totalRecordsGenerated": total_generated,
            "schemasProcessed": results.len(),
            "results": results,
            "stats": stats,
        })
    };

    guard.complete();
    Ok(Json(response))
}

fn split_validated(
    state: &AppState,
    records: &[Value],
    schema: &Value,
) -> (Vec<Value>, Vec<Value>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut invalid = Vec::new();
    for record in records {
        match state.engine.preparer().validate_data(record, schema) {
            Ok(()) => valid.push(record.clone()),
            Err(_) => invalid.push(record.clone()),
        }
    }
    (valid, invalid)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateRequest {
    schema: Value,
}

/// POST `/validate`: schema well-formedness only.
pub(crate) async fn validate(
    State(state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .engine
        .preparer()
        .validate_schema(&body.schema)
        .map_err(|errors| ApiError::validation_details("invalid schema", errors))?;
    Ok(Json(json!({ "success": true, "valid": true })))
}
