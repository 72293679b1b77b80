use crate::services::converter::ConvertError;
use crate::services::temp_store::StagingError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConvertError),

    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::BadRequest(e.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Conversion(ConvertError::Unavailable(msg)) => {
                tracing::error!("Conversion engine unavailable: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to load conversion engine: {}", msg),
                )
            }
            AppError::Conversion(ConvertError::Failed(msg)) => {
                tracing::error!("Error converting PDF: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to convert PDF: {}", msg),
                )
            }
            AppError::Staging(e) => {
                tracing::error!("Staging error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to stage upload: {}", e.io_error()),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "detail": detail
        }));

        (status, body).into_response()
    }
}
