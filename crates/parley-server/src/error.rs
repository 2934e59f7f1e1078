//! Mapping of core errors onto HTTP responses.
//!
//! Negative answers (duplicate handle, unknown record, bad key) become
//! ordinary `{"success": false, "error": ..}` bodies. Storage and integrity
//! failures become 500s and are never reported as success.

use crate::metrics;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_core::Error;
use serde_json::json;
use thiserror::Error as ThisError;
use tracing::error;

/// Error returned by API handlers.
#[derive(Debug, ThisError)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidKey(_) => StatusCode::BAD_REQUEST,
            Error::StorageFailure { .. } | Error::IntegrityError { .. } | Error::Encode { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if self.0.is_server_fault() {
            error!(error = %self.0, "Request failed");
            metrics::record_error(self.0.kind());
            "Internal storage error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
