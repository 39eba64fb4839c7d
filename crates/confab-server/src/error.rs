//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use confab_core::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by the HTTP handlers.
///
/// Rendered as `{"statusCode": .., "name": .., "message": ..}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request parameters are invalid.
    #[error("{0}")]
    BadRequest(String),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Store(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(e) = &self {
            error!(error = %e, "Store request failed");
        }

        let status = self.status();
        let body = json!({
            "statusCode": status.as_u16(),
            "name": self.name(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let bad = ApiError::BadRequest("roomPartner is required".into());
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.name(), "BadRequest");

        let store = ApiError::from(StoreError::Unavailable("down".into()));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.to_string(), "Store unavailable: down");
    }
}
