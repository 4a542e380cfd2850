//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use common::ErrorKind;
use domain::InventoryError;
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request failed validation before reaching a service.
    #[error("{0}")]
    InvalidRequest(String),

    /// The body was not valid JSON for the endpoint.
    #[error("request body must be valid JSON")]
    InvalidJson,

    /// The body exceeded the endpoint's size cap.
    #[error("request body too large")]
    PayloadTooLarge,

    /// A resource lookup came back empty.
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// The named service is not wired into this process.
    #[error("{0} service unavailable")]
    ServiceUnavailable(&'static str),

    /// Reservation lifecycle error.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Checkout or sweeper error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

impl ApiError {
    /// Stable snake_case code rendered in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::InvalidJson => "invalid_json",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::NotFound { code, .. } => *code,
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Inventory(e) => e.code(),
            ApiError::Checkout(e) => e.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::InvalidJson => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inventory(e) => status_for(e.kind()),
            ApiError::Checkout(e) => status_for(e.kind()),
        }
    }
}

/// Maps the shared error taxonomy onto HTTP status codes.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock | ErrorKind::InvalidState | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::ServiceUnavailable | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}
