//! Mapping of engine errors onto HTTP responses.

use {
    axum::{
        extract::rejection::JsonRejection,
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    sandboxed_engine::{ErrorKind, SandboxError},
    serde_json::json,
    tracing::warn,
};

pub enum ApiError {
    /// The request body could not be decoded.
    BadRequest(String),
    Engine(SandboxError),
}

impl From<SandboxError> for ApiError {
    fn from(e: SandboxError) -> Self {
        Self::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("invalid request: {}", rejection.body_text()))
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Resolution | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Submission | ErrorKind::Transport | ErrorKind::Cluster => {
            StatusCode::BAD_GATEWAY
        },
        ErrorKind::ReadinessTimeout | ErrorKind::ExecTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            Self::Engine(e) => {
                let kind = e.kind();
                (status_for(kind), kind.as_str(), e.to_string())
            },
        };
        if status.is_server_error() {
            warn!(%status, error_kind = kind, error = %message, "request failed");
        }
        let body = json!({
            "success": false,
            "error": message,
            "error_kind": kind,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}
