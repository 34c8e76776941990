//! API error types.
//!
//! Every variant maps to one HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::NotFound)` and the client receives `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors surfaced to API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, unknown or expired credential or session.
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller input violates a documented precondition.
    #[error("{message}")]
    BadRequest { message: String },

    /// The referenced entity does not exist.
    #[error("Not found")]
    NotFound,

    /// Catch-all for collaborator failures (store unreachable, disk errors).
    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl ApiError {
    /// Shorthand for a [`ApiError::BadRequest`] with the given message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::InternalError(ref cause) = self {
            error!("Internal error: {:#}", cause);
        }
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
