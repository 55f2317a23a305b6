//! The error type every HTTP handler returns, mapped uniformly to a status code.
//!
//! Adapted from the teacher's `HttpError`/`HttpErrorBuilder` builder shape, narrowed to the status
//! codes this surface actually emits (§6: 400/401/404/409/500) and wired directly off the
//! component boundary error enums instead of a generic `#[track_caller]` location.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ride_core::RideCoreError;
use ride_store::StoreError;
use serde_json::json;
use tracing::error;

pub struct HttpError {
    code: StatusCode,
    message: String,
}

impl HttpError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { code: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self { code: StatusCode::UNAUTHORIZED, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { code: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self { code: StatusCode::CONFLICT, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { code: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        error!(code = %self.code, message = %self.message, "request failed");
        (self.code, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RideCoreError> for HttpError {
    fn from(err: RideCoreError) -> Self {
        match err {
            RideCoreError::NotFound(id) => HttpError::not_found(format!("ride {id} not found")),
            RideCoreError::Conflict { operation, from } => {
                HttpError::conflict(format!("`{operation}` is not permitted from status `{from}`"))
            }
            RideCoreError::Store(err) => HttpError::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => HttpError::conflict("a record with that email already exists"),
            err => HttpError::internal(err.to_string()),
        }
    }
}
