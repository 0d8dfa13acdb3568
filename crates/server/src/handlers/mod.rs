pub(crate) mod admin;
pub(crate) mod bench;
pub(crate) mod generate;
pub(crate) mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dataforge_engine::{Engine, Mode};

use crate::error::ApiError;
use crate::state::AppState;

pub(crate) const MIN_COUNT: u64 = 1;
pub(crate) const MAX_COUNT: u64 = 10_000_000;
pub(crate) const DEFAULT_COUNT: u64 = 10;

pub(crate) const MIN_BATCH_SIZE: u64 = 10;
pub(crate) const MAX_BATCH_SIZE: u64 = 10_000;
pub(crate) const DEFAULT_BATCH_SIZE: u64 = 1_000;

/// Body accepted by `/generate` and both streaming endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    pub(crate) schema: Option<Value>,
    pub(crate) schemas: Option<Vec<SchemaSpec>>,
    pub(crate) count: Option<u64>,
    #[serde(default)]
    pub(crate) validate_data: bool,
    #[serde(default)]
    pub(crate) random_mode: bool,
    #[serde(default)]
    pub(crate) streaming: bool,
    pub(crate) batch_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SchemaSpec {
    pub(crate) schema: Value,
    pub(crate) collection: Option<String>,
    pub(crate) count: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct PlanTarget {
    pub(crate) collection: Option<String>,
    pub(crate) schema: Value,
    pub(crate) count: u64,
}

/// A validated generation request, ready to register.
#[derive(Debug)]
pub(crate) struct JobPlan {
    pub(crate) targets: Vec<PlanTarget>,
    pub(crate) total: u64,
    /// Single schema without a collection label: the legacy response shape.
    pub(crate) single_untagged: bool,
    pub(crate) mode: Mode,
    pub(crate) validate_data: bool,
    pub(crate) batch_size: u64,
}

/// Validate counts, batch size and every schema before anything registers.
pub(crate) fn plan_request(state: &AppState, body: GenerateRequest) -> Result<JobPlan, ApiError> {
    let mut from_schemas = false;
    let targets = match (body.schema, body.schemas) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(ApiError::validation(
                "exactly one of `schema` or `schemas` must be provided",
            ));
        }
        (Some(schema), None) => vec![PlanTarget {
            collection: None,
            schema,
            count: body.count.unwrap_or(DEFAULT_COUNT),
        }],
        (None, Some(specs)) => {
            from_schemas = true;
            if specs.is_empty() {
                return Err(ApiError::validation("`schemas` must not be empty"));
            }
            specs
                .into_iter()
                .map(|spec| PlanTarget {
                    collection: spec.collection,
                    count: spec.count.or(body.count).unwrap_or(DEFAULT_COUNT),
                    schema: spec.schema,
                })
                .collect()
        }
    };

    for target in &targets {
        if !(MIN_COUNT..=MAX_COUNT).contains(&target.count) {
            return Err(ApiError::validation(format!(
                "count must be between {MIN_COUNT} and {MAX_COUNT}, got {}",
                target.count
            )));
        }
    }

    let batch_size = body.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(ApiError::validation(format!(
            "batchSize must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}, got {batch_size}"
        )));
    }

    for target in &targets {
        state
            .engine
            .preparer()
            .validate_schema(&target.schema)
            .map_err(|errors| ApiError::validation_details("invalid schema", errors))?;
    }

    let single_untagged = !from_schemas && targets.len() == 1 && targets[0].collection.is_none();
    let total = targets.iter().map(|t| t.count).sum();

    Ok(JobPlan {
        targets,
        total,
        single_untagged,
        mode: if body.random_mode { Mode::Fuzz } else { Mode::Strict },
        validate_data: body.validate_data,
        batch_size,
    })
}

pub(crate) fn external_job_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-job-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|id| !id.is_empty())
}

pub(crate) fn records_per_second(records: u64, elapsed: Duration) -> f64 {
    records as f64 / elapsed.as_secs_f64().max(0.001)
}

/// Keeps a buffered job's registry entry alive for the handler's lifetime.
///
/// Dropping the guard unregisters the job; dropping it before `complete`
/// (an error return, or the client hanging up and the handler future being
/// dropped) also cancels the job's token so in-flight pool tasks unwind.
pub(crate) struct JobGuard {
    engine: Arc<Engine>,
    request_id: u64,
    token: CancellationToken,
    completed: bool,
}

impl JobGuard {
    pub(crate) fn new(engine: Arc<Engine>, request_id: u64, token: CancellationToken) -> Self {
        Self {
            engine,
            request_id,
            token,
            completed: false,
        }
    }

    pub(crate) fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.token.cancel();
        }
        self.engine.unregister(self.request_id);
    }
}
