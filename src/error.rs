use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("already running: {0}")]
    AlreadyRunning(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("index generation failed: {0}")]
    IndexGeneration(String),

    #[error("document store error: {0}")]
    Store(String),

    #[error("cannot encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl Error {
    fn error_type(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NotFound",
            Error::InvalidInput(_) => "InvalidInput",
            Error::AlreadyRunning(_) => "AlreadyRunning",
            Error::Unauthorized(_) => "Unauthorized",
            Error::Upload(_) => "UploadError",
            Error::IndexGeneration(_) => "IndexGenerationError",
            Error::Store(_) | Error::Http(_) => "StoreError",
            Error::Encode(_) | Error::Io(_) | Error::Internal(_) => "InternalError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::AlreadyRunning(_) => StatusCode::CONFLICT,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Store(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Upload(_)
            | Error::IndexGeneration(_)
            | Error::Encode(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error_type(),
            message: self.to_string(),
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}
