//! Errors returned by our HTTP handlers.

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{format::ErrorResponse, prelude::*};

/// An error we report to the client as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request itself was unacceptable.
    #[error("{0}")]
    BadRequest(String),

    /// The requested file does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The multipart body could not be parsed, or was too large.
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// Something went wrong on our side.
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Shorthand for [`ApiError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// The HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Multipart(err) => err.status(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "request failed: {}", self);
        } else {
            debug!(%status, "rejected request: {}", self);
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_statuses() {
        assert_eq!(
            ApiError::bad_request("No file part").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("File not found".to_owned()).status(),
            StatusCode::NOT_FOUND
        );
        let internal = ApiError::from(anyhow!("disk full").context("failed to store upload"));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.to_string(), "failed to store upload: disk full");
    }
}
