//! Gateway error taxonomy.
//!
//! Library-facing code (HTTP clients, EPUB rewriting) works with `anyhow`;
//! everything that reaches a handler is folded into [`Error`], which decides
//! the HTTP status and renders the `{"error": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing configuration, including the credential file.
    #[error("{0}")]
    Config(String),

    /// Missing or rejected API key.
    #[error("Invalid or missing API key")]
    Auth,

    /// Missing JSON body or field.
    #[error("{0}")]
    Validation(String),

    /// Search returned nothing, even without a format filter.
    #[error("{0}")]
    NotFound(String),

    /// The catalogue, completion API or storage failed.
    #[error("{0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No logged-in catalogue session.
    #[error("ZLibrary not initialized or login failed")]
    NotInitialized,
}

impl Error {
    pub fn missing_field(name: &str) -> Self {
        Error::Validation(format!("Missing required field: {}", name))
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Error::Upstream(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Auth => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Config(_) | Error::Upstream(_) | Error::Io(_) | Error::NotInitialized => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Prefix a 500-class error with the operation that failed.
    /// Client errors keep their message so callers see the exact field or key problem.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Error::Upstream(msg) => Error::Upstream(format!("{}: {}", context, msg)),
            Error::Config(msg) => Error::Upstream(format!("{}: {}", context, msg)),
            Error::Io(e) => Error::Upstream(format!("{}: {}", context, e)),
            other => other,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Upstream(format!("{:#}", value))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
