//! Handler error type.
//!
//! Handlers return `Result<T, WebError>`; the conversion into a response
//! picks the status code. Internal failures are logged in full and the
//! client only sees a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use digest_core::{CoreError, ErrorExt};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("pipeline error: {0}")]
    Core(#[from] CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            WebError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            WebError::Template(e) => {
                error!(error = %e, "template rendering failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            WebError::Core(e) => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.user_friendly_message())
            }
            WebError::Io(e) => {
                error!(error = %e, "io error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };

        (status, message).into_response()
    }
}
