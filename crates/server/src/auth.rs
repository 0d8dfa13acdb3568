use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// API-key plus IP-whitelist gate for the protected routes.
///
/// Key check first (401), whitelist second (403). Either check is skipped
/// when its configuration is empty.
pub(crate) async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = req
            .headers()
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            return ApiError::unauthorized().into_response();
        }
    }

    if !state.whitelist.is_empty() {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        match peer {
            Some(ip) if state.whitelist.contains(&ip) => {}
            Some(ip) => {
                return ApiError::forbidden(format!("address {ip} is not whitelisted"))
                    .into_response();
            }
            None => {
                return ApiError::forbidden("peer address unavailable").into_response();
            }
        }
    }

    next.run(req).await
}
