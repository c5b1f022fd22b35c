//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use ytclip_media::{MediaError, PipelineError};

use crate::config;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(e) => match e {
                e if e.is_validation() => StatusCode::BAD_REQUEST,
                PipelineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Media(e) => match e {
                MediaError::OutsideWorkspaceRoot(_) => StatusCode::BAD_REQUEST,
                MediaError::ArtifactNotFound { .. } => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
            ApiError::Pipeline(e) => e.code(),
            ApiError::Media(e) => match e {
                MediaError::OutsideWorkspaceRoot(_) => "invalid_path",
                MediaError::ArtifactNotFound { .. } => "not_found",
                _ => "io_error",
            },
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_) | ApiError::Media(MediaError::Io(_) | MediaError::ToolNotFound(_))
        )
    }

    /// Message sent to the client. Internal details are hidden in production.
    fn public_detail(&self, production: bool) -> String {
        if production && self.is_internal() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let production = std::env::var("ENVIRONMENT").is_ok_and(|env| config::is_production(&env));

        let body = ErrorResponse {
            detail: self.public_detail(production),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use ytclip_media::ToolStage;
    use ytclip_models::ValidationError;

    #[test]
    fn test_pipeline_status_codes() {
        let validation: ApiError =
            PipelineError::from(ValidationError::MissingFields(vec!["title"])).into();
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(validation.code(), "validation_error");
        assert_eq!(validation.to_string(), "Missing required fields: title");

        let timeout: ApiError = PipelineError::Timeout {
            stage: ToolStage::Render,
            after: Duration::from_secs(1),
        }
        .into();
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_media_status_codes() {
        let outside: ApiError = MediaError::OutsideWorkspaceRoot(PathBuf::from("/etc")).into();
        assert_eq!(outside.status_code(), StatusCode::BAD_REQUEST);

        let missing: ApiError = MediaError::artifact_not_found("/tmp/x", None).into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "not_found");
    }

    #[test]
    fn test_internal_detail_hidden_in_production() {
        let err = ApiError::internal("disk on fire");
        assert_eq!(err.public_detail(true), "An internal error occurred");
        assert_eq!(err.public_detail(false), "Internal error: disk on fire");

        let bad = ApiError::bad_request("Missing file parameter");
        assert_eq!(bad.public_detail(true), "Bad request: Missing file parameter");
    }

    #[test]
    fn test_error_response_shape() {
        let response = ApiError::bad_request("Missing file parameter").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
