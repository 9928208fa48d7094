use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pixelforge_core::{CatalogError, DownscaleError};
use pixelforge_runtime_api::GenerateError;
use thiserror::Error;

/// Error returned by handlers, rendered as `{"error": "<message>"}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        match e {
            GenerateError::InvalidRequest(_) | GenerateError::UnsupportedAdapter(_) => {
                ApiError::BadRequest(e.to_string())
            }
            GenerateError::CheckpointNotFound(_) | GenerateError::AdapterNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            GenerateError::Load(_) | GenerateError::Inference(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::InvalidName { .. } => ApiError::BadRequest(e.to_string()),
            CatalogError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            CatalogError::Io { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DownscaleError> for ApiError {
    fn from(e: DownscaleError) -> Self {
        match e {
            DownscaleError::InvalidDimension { .. } | DownscaleError::TooLarge { .. } => {
                ApiError::BadRequest(e.to_string())
            }
            DownscaleError::UnsupportedFormat(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Rejected request: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelforge_core::TargetSize;

    #[test]
    fn backend_errors_map_to_status() {
        let cases = [
            (GenerateError::InvalidRequest("too long".into()), StatusCode::BAD_REQUEST),
            (GenerateError::UnsupportedAdapter("lora".into()), StatusCode::BAD_REQUEST),
            (GenerateError::CheckpointNotFound("x".into()), StatusCode::NOT_FOUND),
            (GenerateError::AdapterNotFound("y".into()), StatusCode::NOT_FOUND),
            (GenerateError::Load("oom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (GenerateError::Inference("nan".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn invalid_size_is_a_bad_request() {
        let err = TargetSize::new(0, 16).unwrap_err();
        let api = ApiError::from(err);
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert!(api.to_string().contains("0x16"));

        let api = ApiError::from(DownscaleError::TooLarge {
            width: 4096,
            height: 4096,
        });
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
    }
}
