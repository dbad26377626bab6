//! Error → HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diarist_core::error::{AuthError, Error, ErrorKind};
use tracing::{error, warn};

/// Any handler failure. Renders as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self(Error::Auth(e))
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(Error::validation(message))
    }

    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self.0.kind() {
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Unauthorized => self.0.to_string(),
            ErrorKind::UpstreamUnavailable => {
                warn!(error = %self.0, "Upstream failure");
                "Service temporarily unavailable, please retry".to_string()
            }
            ErrorKind::Internal => {
                error!(error = %self.0, "Request failed");
                "Internal server error".to_string()
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
