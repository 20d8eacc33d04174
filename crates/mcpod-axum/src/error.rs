//! Axum-specific error types and mappings.
//!
//! Every failure leaves the gateway as `{ "error": { "message", "type" } }`
//! with a stable `type` discriminant clients can branch on.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mcpod_core::{McpServiceError, RepositoryError, RuntimeError};
use mcpod_runtime::error_envelope;
use thiserror::Error;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict (resource already exists or state forbids the change).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The pod could not be provisioned.
    #[error("Provisioning failed: {0}")]
    Provision(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Provision(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error type discriminant for client-side handling.
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "invalid_request",
            Self::Conflict(_) => "conflict",
            Self::Provision(_) => "provision_error",
            Self::Internal(_) => "api_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Provision(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "Request failed");
        }
        let body = error_envelope(self.message(), self.error_type());
        (self.status(), axum::Json(body)).into_response()
    }
}

impl From<RepositoryError> for HttpError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => Self::NotFound(msg),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Storage(msg) => Self::Internal(format!("Storage: {msg}")),
            RepositoryError::Serialization(msg) => Self::Internal(format!("Serialization: {msg}")),
        }
    }
}

impl From<RuntimeError> for HttpError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Provision(msg) => Self::Provision(msg),
            RuntimeError::NotFound(msg) => Self::NotFound(msg),
            RuntimeError::AlreadyRunning(id) => {
                Self::Conflict(format!("Pod already running for server {id}"))
            }
            RuntimeError::InvalidConfig(msg) => Self::BadRequest(msg),
            RuntimeError::Repository(repo_err) => repo_err.into(),
            err @ (RuntimeError::ProtocolIo(_) | RuntimeError::Backend(_)) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<McpServiceError> for HttpError {
    fn from(err: McpServiceError) -> Self {
        match err {
            McpServiceError::Repository(repo_err) => repo_err.into(),
            McpServiceError::Runtime(runtime_err) => runtime_err.into(),
            McpServiceError::InvalidConfig(msg) => Self::BadRequest(msg),
            McpServiceError::Installation(msg) => Self::Conflict(msg),
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_errors_map_to_envelope_types() {
        let cases = [
            (
                HttpError::from(McpServiceError::Runtime(RuntimeError::pod_not_found("s1"))),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                HttpError::from(McpServiceError::InvalidConfig("name is empty".into())),
                StatusCode::BAD_REQUEST,
                "invalid_request",
            ),
            (
                HttpError::from(McpServiceError::Repository(RepositoryError::Conflict(
                    "dup".into(),
                ))),
                StatusCode::CONFLICT,
                "conflict",
            ),
            (
                HttpError::from(RuntimeError::Provision("never ready".into())),
                StatusCode::SERVICE_UNAVAILABLE,
                "provision_error",
            ),
            (
                HttpError::from(RuntimeError::ProtocolIo("broken pipe".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
            ),
        ];

        for (err, status, kind) in cases {
            assert_eq!(err.status(), status, "{err}");
            assert_eq!(err.error_type(), kind, "{err}");
        }
    }
}
