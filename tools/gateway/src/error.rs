//! HTTP rendering of errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use sidegate_common::Error;

/// Error returned from route handlers.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::AccessDenied(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Producer(_) | Error::Network(_) | Error::Runtime(_) => StatusCode::BAD_GATEWAY,
            Error::Security(_) | Error::Io(_) | Error::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client.
    fn public_message(&self) -> String {
        match &self.0 {
            Error::AccessDenied(_) => "Access denied".to_string(),
            Error::Security(_) | Error::Io(_) | Error::Serialization(_) => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
