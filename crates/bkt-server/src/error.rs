use axum::http::header::ALLOW;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error};

use bkt_store::StoreError;

use crate::handler::ALLOWED_METHODS;
use crate::range::RangeError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("request body exceeds limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("content length required")]
    LengthRequired,

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("range error: {0}")]
    Range(#[from] RangeError),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(Method),

    #[error("CSRF token missing or invalid")]
    CsrfRejected,

    #[error("consistency fault: {0}")]
    Consistency(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::BodyTooLarge { .. } => StatusCode::BAD_REQUEST,
            Self::LengthRequired => StatusCode::LENGTH_REQUIRED,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::Range(RangeError::Unsatisfiable) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Range(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::CsrfRejected => StatusCode::FORBIDDEN,
            // A bucket and a value competing for one key is the client's path.
            Self::Store(StoreError::IncompatibleValue(_) | StoreError::EmptyKey) => {
                StatusCode::BAD_REQUEST
            }
            Self::Consistency(_)
            | Self::Store(_)
            | Self::Metadata(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// One-line message sent to the client.
    fn public_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Not found.",
            Self::BadRequest(msg) => *msg,
            Self::BodyTooLarge { .. } => "Request too large.",
            Self::LengthRequired => "Length required.",
            Self::PreconditionFailed(_) => "Precondition failed.",
            Self::Range(RangeError::Unsatisfiable) => "Requested range not satisfiable.",
            Self::Range(_) => "Bad request.",
            Self::MethodNotAllowed(_) => "Method not allowed.",
            Self::CsrfRejected => "Forbidden - CSRF token invalid",
            Self::Store(StoreError::IncompatibleValue(_)) => {
                "Path conflicts with an existing bucket or value."
            }
            Self::Store(StoreError::EmptyKey) => "Invalid path.",
            _ => "Internal server error.",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let mut response = (status, format!("{}\n", self.public_message())).into_response();
        if let Self::MethodNotAllowed(_) = self {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        response
    }
}
