use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Value, json};

use dataforge_engine::EngineError;

/// Error envelope returned on every failure path:
/// `{success: false, error: {code, message, ...}, requestId, timestamp}`.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request_id: Option<u64>,
    extras: Vec<(&'static str, Value)>,
}

fn status_aborted() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: None,
            extras: Vec::new(),
        }
    }

    pub(crate) fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub(crate) fn validation_details(message: impl Into<String>, details: Vec<String>) -> Self {
        let mut err = Self::validation(message);
        err.extras.push(("details", json!(details)));
        err
    }

    pub(crate) fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "missing or invalid API key",
        )
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub(crate) fn aborted(job_id: Option<&str>) -> Self {
        let mut err = Self::new(status_aborted(), "JOB_ABORTED", "job stopped by user");
        if let Some(job_id) = job_id {
            err.extras.push(("jobId", json!(job_id)));
        }
        err
    }

    pub(crate) fn generation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "GENERATION_ERROR",
            message,
        )
    }

    pub(crate) fn not_found(path: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("no route for {path}"),
        )
    }

    /// Map an engine failure for a registered job.
    pub(crate) fn from_engine(err: EngineError, job_id: Option<&str>, request_id: u64) -> Self {
        match err {
            EngineError::Cancelled => Self::aborted(job_id).with_request_id(request_id),
            EngineError::Generation(message) => {
                Self::generation(message).with_request_id(request_id)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        for (key, value) in self.extras {
            error[key] = value;
        }

        let body = json!({
            "success": false,
            "error": error,
            "requestId": self.request_id,
            "timestamp": Utc::now().to_rfc3339(),
        });
        (self.status, Json(body)).into_response()
    }
}
