use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use tracepoint_core::CoreError;
use tracepoint_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing '{0}' query parameter")]
    MissingParameter(&'static str),

    #[error("Malformed query string: {0}")]
    MalformedQuery(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_) | ApiError::MalformedQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(CoreError::MissingParameter(_) | CoreError::InvalidDate { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text returned to the caller. Upstream details stay in the server log.
    fn public_message(&self) -> String {
        match self {
            ApiError::Core(CoreError::Store(StoreError::NotFound(_))) => "File not found".into(),
            ApiError::Core(CoreError::Store(_)) => "Storage request failed".into(),
            ApiError::Core(CoreError::Snapshot(_)) => "Malformed device record in storage".into(),
            ApiError::Core(CoreError::InvalidDocument { .. }) => "File is not valid JSON".into(),
            other => other.to_string(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::MalformedQuery(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Rejected request");
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
