//! Error types for bugvault.
//!
//! Uses thiserror for ergonomic error definitions that integrate
//! with axum's response system. Every upload, policy and storage failure
//! has its own variant so callers can render a specific message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Auth errors
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Invalid token")]
    InvalidToken,

    // Resource errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bug {0} is read-only")]
    BugReadOnly(i64),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Upload transport errors
    #[error("No file was uploaded")]
    FileNoUpload,

    #[error("File upload failed: temporary file is not readable")]
    FileUploadFailed,

    // Upload policy errors
    #[error("File too large: max {max_size} bytes")]
    FileTooBig { max_size: u64 },

    #[error("File type not allowed: {0}")]
    FileTypeNotAllowed(String),

    #[error("Duplicate file: {0}")]
    FileDuplicate(String),

    // Storage errors
    #[error("Failed to move file: {0}")]
    FileMoveFailed(String),

    #[error("Invalid upload path: {0}")]
    InvalidUploadPath(String),

    #[error("FTP connection failed: {0}")]
    FtpConnectionFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    // Data errors
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    // Configuration errors
    #[error("Unknown file upload method: {0}")]
    UnknownUploadMethod(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // External service errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401
            Self::Unauthenticated | Self::InvalidToken => StatusCode::UNAUTHORIZED,

            // 403
            Self::Forbidden | Self::BugReadOnly(_) => StatusCode::FORBIDDEN,

            // 404
            Self::NotFound(_) | Self::FileNotFound(_) => StatusCode::NOT_FOUND,

            // 409
            Self::FileDuplicate(_) => StatusCode::CONFLICT,

            // 400
            Self::Validation(_)
            | Self::InvalidInput(_)
            | Self::FileNoUpload
            | Self::FileTypeNotAllowed(_)
            | Self::FieldNotFound(_) => StatusCode::BAD_REQUEST,

            // 413
            Self::FileTooBig { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 502
            Self::FtpConnectionFailed(_) => StatusCode::BAD_GATEWAY,

            // 500
            Self::FileUploadFailed
            | Self::FileMoveFailed(_)
            | Self::InvalidUploadPath(_)
            | Self::UnknownUploadMethod(_)
            | Self::Config(_)
            | Self::Database(_)
            | Self::Internal(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BugReadOnly(_) => "BUG_READ_ONLY",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::FileNoUpload => "FILE_NO_UPLOAD",
            Self::FileUploadFailed => "FILE_UPLOAD_FAILED",
            Self::FileTooBig { .. } => "FILE_TOO_BIG",
            Self::FileTypeNotAllowed(_) => "FILE_TYPE_NOT_ALLOWED",
            Self::FileDuplicate(_) => "FILE_DUPLICATE",
            Self::FileMoveFailed(_) => "FILE_MOVE_FAILED",
            Self::InvalidUploadPath(_) => "INVALID_UPLOAD_PATH",
            Self::FtpConnectionFailed(_) => "FTP_CONNECTION_FAILED",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::FieldNotFound(_) => "FIELD_NOT_FOUND",
            Self::UnknownUploadMethod(_) => "UNKNOWN_UPLOAD_METHOD",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code = code, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

// Convenience conversions
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_errors_map_to_client_statuses() {
        assert_eq!(Error::FileNoUpload.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::FileTooBig { max_size: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Error::FileDuplicate("a.txt".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::FileTypeNotAllowed("exe".into()).error_code(),
            "FILE_TYPE_NOT_ALLOWED"
        );
    }

    #[test]
    fn test_storage_errors_are_server_side() {
        assert!(Error::FileMoveFailed("x".into()).status_code().is_server_error());
        assert!(Error::InvalidUploadPath("/nope".into())
            .status_code()
            .is_server_error());
        assert_eq!(
            Error::FtpConnectionFailed("login".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
