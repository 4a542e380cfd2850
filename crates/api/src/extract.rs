//! Size-capped JSON bodies.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// A request body read under the route's `DefaultBodyLimit`.
///
/// Oversize bodies are rejected with 413 before any JSON is parsed.
#[derive(Debug, Clone)]
pub struct LimitedBody(pub Bytes);

impl<S> FromRequest<S> for LimitedBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Bytes::from_request(req, state).await {
            Ok(bytes) => Ok(Self(bytes)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(ApiError::PayloadTooLarge)
            }
            Err(rejection) => Err(ApiError::InvalidRequest(rejection.body_text())),
        }
    }
}

impl LimitedBody {
    fn is_blank(&self) -> bool {
        self.0.iter().all(u8::is_ascii_whitespace)
    }

    /// Decodes a required JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.is_blank() {
            return Err(ApiError::InvalidRequest("request body is required".into()));
        }
        serde_json::from_slice(&self.0).map_err(|_| ApiError::InvalidJson)
    }

    /// Decodes an optional JSON body; an empty body is `T::default()`.
    pub fn json_or_default<T: DeserializeOwned + Default>(&self) -> Result<T, ApiError> {
        if self.is_blank() {
            return Ok(T::default());
        }
        serde_json::from_slice(&self.0).map_err(|_| ApiError::InvalidJson)
    }
}
