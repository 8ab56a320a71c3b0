use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failure of one submitted unit. One file failing never aborts its
/// siblings in a batch; callers collect these per file.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("corrupt archive {file}: {message}")]
    CorruptArchive { file: String, message: String },

    #[error("{file}: {message}")]
    Schema { file: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Import(ImportError::CorruptArchive { .. })
            | AppError::Import(ImportError::Schema { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Import(ImportError::Storage(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
