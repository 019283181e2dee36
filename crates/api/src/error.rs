//! Error rendering for API responses.
//!
//! Every failure is rendered as
//! `{"error": CODE, "message": text, "details"?: {...}}` with the status and
//! code taken from [`AppError`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use stowage_core::storage::StorageError;
use stowage_core::upload::UploadError;
use stowage_shared::AppError;
use tracing::error;

/// An error ready to be rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    error: AppError,
    details: Option<Value>,
}

impl ApiError {
    /// Attach structured details to the response body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Error code of the response.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.error.error_code()
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self {
            error,
            details: None,
        }
    }
}

fn storage_app_error(err: &StorageError) -> AppError {
    match err {
        StorageError::NotFound { .. } => AppError::NotFound(err.to_string()),
        StorageError::UnknownProfile(_) | StorageError::InvalidKey(_) => {
            AppError::Validation(err.to_string())
        }
        StorageError::Remote(_) | StorageError::Operation(_) => {
            AppError::ExternalService(err.to_string())
        }
        StorageError::MultipartNotSupported { .. }
        | StorageError::Configuration(_)
        | StorageError::Io(_) => AppError::Internal(err.to_string()),
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Validation(msg) => AppError::Validation(msg).into(),
            UploadError::SessionNotFound(_) => AppError::NotFound(err.to_string()).into(),
            UploadError::StrategyMismatch { .. } | UploadError::Finalizing(_) => {
                AppError::Conflict(err.to_string()).into()
            }
            UploadError::IncompleteUpload {
                ref uploaded,
                total_parts,
            } => {
                let details = json!({
                    "uploaded_parts": uploaded,
                    "total_parts": total_parts,
                });
                Self::from(AppError::BusinessRule(err.to_string())).with_details(details)
            }
            UploadError::RemoteProvider(_) => AppError::ExternalService(err.to_string()).into(),
            UploadError::Storage(ref storage) => storage_app_error(storage).into(),
            UploadError::Store(_) => AppError::Internal(err.to_string()).into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.error, "Request failed");
            "An internal error occurred"
        } else {
            self.error.message()
        };

        let mut body = json!({
            "error": self.code(),
            "message": message,
        });
        if let (Some(details), Some(map)) = (self.details, body.as_object_mut()) {
            map.insert("details".to_string(), details);
        }

        (status, Json(body)).into_response()
    }
}
