use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Which end of a chunk copy could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSide {
    Input,
    Output,
}

impl std::fmt::Display for StreamSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamSide::Input => f.write_str("input"),
            StreamSide::Output => f.write_str("output"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Can't open temporary directory {path:?}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't open {side} stream: {reason}")]
    StreamOpenFailure { side: StreamSide, reason: String },

    #[error("Unable to find requested file: {0}")]
    InvalidFileReference(String),

    #[error("Completion callback failed: {0}")]
    CallbackFailure(anyhow::Error),

    #[error("Request exceeded the maximum execution time of {0} seconds")]
    Timeout(u64),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn input_stream(reason: impl std::fmt::Display) -> Self {
        AppError::StreamOpenFailure {
            side: StreamSide::Input,
            reason: reason.to_string(),
        }
    }

    pub fn output_stream(reason: impl std::fmt::Display) -> Self {
        AppError::StreamOpenFailure {
            side: StreamSide::Output,
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidFileReference(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::DirectoryUnavailable { path, source } => {
                tracing::error!("Temporary directory {:?} unavailable: {:?}", path, source);
                "Can't open temporary directory.".to_string()
            }
            AppError::StreamOpenFailure { side, reason } => {
                tracing::error!("Failed to open {} stream: {}", side, reason);
                format!("Can't open {} stream.", side)
            }
            AppError::CallbackFailure(e) => {
                tracing::error!("Completion callback error: {:?}", e);
                "Internal Server Error".to_string()
            }
            AppError::Timeout(_) => {
                tracing::error!("{}", self);
                self.to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Internal Server Error".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {:?}", e);
                "Internal Server Error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                "Internal Server Error".to_string()
            }
            AppError::InvalidFileReference(_) => "Unable to find requested file".to_string(),
            AppError::BadRequest(msg) | AppError::PayloadTooLarge(msg) => msg.clone(),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
