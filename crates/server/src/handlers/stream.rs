use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use dataforge_engine::{Mode, StreamEvent, StreamTarget};

use crate::error::ApiError;
use crate::state::AppState;

use super::{external_job_id, plan_request, records_per_second};

/// POST `/generate-stream`: single-schema NDJSON stream.
pub(crate) async fn generate_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<super::GenerateRequest>,
) -> Result<Response, ApiError> {
    let plan = plan_request(&state, body)?;
    if plan.targets.len() != 1 {
        return Err(ApiError::validation(
            "streaming takes a single schema; use /generate-stream-multi for several",
        ));
    }

    let job_id = external_job_id(&headers);
    let (request_id, token) = state.engine.register_job(job_id, plan.total).await;

    let target = &plan.targets[0];
    let prepared = state.engine.preparer().prepare(&target.schema, plan.mode);
    let rx = state.engine.clone().stream_job(
        request_id,
        prepared,
        target.count,
        plan.batch_size,
        plan.mode == Mode::Fuzz,
        token,
    );
    ndjson_response(rx)
}

/// POST `/generate-stream-multi`: schemas streamed sequentially.
pub(crate) async fn generate_stream_multi(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<super::GenerateRequest>,
) -> Result<Response, ApiError> {
    let plan = plan_request(&state, body)?;

    let job_id = external_job_id(&headers);
    let (request_id, token) = state.engine.register_job(job_id, plan.total).await;

    let targets: Vec<StreamTarget> = plan
        .targets
        .iter()
        .enumerate()
        .map(|(idx, target)| StreamTarget {
            collection: target
                .collection
                .clone()
                .unwrap_or_else(|| format!("schema_{idx}")),
            schema: state.engine.preparer().prepare(&target.schema, plan.mode),
            count: target.count,
        })
        .collect();

    let rx = state.engine.clone().stream_multi_job(
        request_id,
        targets,
        plan.batch_size,
        plan.mode == Mode::Fuzz,
        token,
    );
    ndjson_response(rx)
}

/// Wrap the engine's event channel as a chunked NDJSON body. Intermediate
/// proxies must not buffer the stream, hence `X-Accel-Buffering: no`.
fn ndjson_response(rx: mpsc::Receiver<StreamEvent>) -> Result<Response, ApiError> {
    let lines = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event_line(&event)));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(lines))
        .map_err(|err| ApiError::generation(format!("failed to build stream response: {err}")))
}

fn event_line(event: &StreamEvent) -> Vec<u8> {
    let value = match event {
        StreamEvent::Chunk {
            index,
            data,
            completed,
            total,
            duration_ms,
        } => json!({
            "chunk": index,
            "data": data,
            "progress": {
                "completed": completed,
                "total": total,
                "percentage": percentage(*completed, *total),
            },
            "chunkStats": { "size": data.len(), "duration": duration_ms },
        }),
        StreamEvent::CollectionComplete {
            collection,
            records_sent,
        } => json!({
            "collectionComplete": true,
            "collection": collection,
            "recordsSent": records_sent,
        }),
        StreamEvent::Done {
            total_records,
            chunks_streamed,
            duration_ms,
        } => json!({
            "done": true,
            "stats": {
                "totalRecords": total_records,
                "chunksStreamed": chunks_streamed,
                "duration": duration_ms,
                "recordsPerSecond": records_per_second(
                    *total_records,
                    std::time::Duration::from_millis(*duration_ms),
                ),
                "avgChunkDuration": duration_ms.checked_div(*chunks_streamed).unwrap_or(0),
            },
        }),
        StreamEvent::Aborted { completed } => json!({
            "error": "aborted",
            "message": "Job stopped by user",
            "completed": completed,
        }),
        StreamEvent::Failed { message, completed } => json!({
            "error": "generation_failed",
            "message": message,
            "completed": completed,
        }),
    };

    let mut line = value.to_string().into_bytes();
    line.push(b'\n');
    line
}

fn percentage(completed: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    (completed * 100) / total
}
