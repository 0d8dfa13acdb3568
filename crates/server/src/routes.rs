use axum::extract::DefaultBodyLimit;
use axum::http::Uri;
use axum::routing::{get, post};
use axum::{Router, middleware};

use crate::auth;
use crate::error::ApiError;
use crate::handlers::{admin, bench, generate, stream};
use crate::state::AppState;

/// Assemble the full HTTP surface. Everything except the probes sits
/// behind the API-key/whitelist gate.
pub(crate) fn router(state: AppState, body_limit: usize) -> Router {
    let protected = Router::new()
        .route("/generate", post(generate::generate))
        .route("/generate-stream", post(stream::generate_stream))
        .route("/generate-stream-multi", post(stream::generate_stream_multi))
        .route("/validate", post(generate::validate))
        .route("/benchmark", post(bench::benchmark))
        .route("/stop-job/:job_id", post(admin::stop_job))
        .route("/kill/:request_id", post(admin::kill))
        .route("/kill-all", post(admin::kill_all))
        .route("/requests", get(admin::requests))
        .route("/pool-stats", get(admin::pool_stats))
        .route("/metrics", get(admin::metrics))
        .route("/gc", post(admin::gc))
        .route("/clear-cache", post(admin::clear_cache))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(admin::health))
        .route("/ready", get(admin::ready))
        .route("/live", get(admin::live))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path())
}
