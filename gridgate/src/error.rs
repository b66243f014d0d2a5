use std::sync::PoisonError;
use axum::extract::rejection::JsonRejection;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;
use utoipa::ToSchema;

/// Stable failure codes surfaced to callers in every failure envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    InvalidFormat,
    InvalidType,
    BadFilter,
    ValidationFailed,
    ConstraintViolation,
    TimedOut,
    Internal,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized        => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound            => StatusCode::NOT_FOUND,
            ErrorCode::InvalidFormat       => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidType         => StatusCode::BAD_REQUEST,
            ErrorCode::BadFilter           => StatusCode::BAD_REQUEST,
            ErrorCode::ValidationFailed    => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ConstraintViolation => StatusCode::CONFLICT,
            ErrorCode::TimedOut            => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Internal            => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json rejection: {0}")]
    JsonRejection(#[from] JsonRejection),

    #[error("Join: {0}")]
    JoinError(#[from] JoinError),

    #[error("{message}")]
    Grid { code: ErrorCode, message: String },

    #[error("Custom error: {0}")]
    Custom(String),
}

impl AppError {
    pub fn grid(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Grid { code, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self { Self::grid(ErrorCode::Unauthorized, message) }
    pub fn not_found(message: impl Into<String>) -> Self { Self::grid(ErrorCode::NotFound, message) }
    pub fn invalid_format(message: impl Into<String>) -> Self { Self::grid(ErrorCode::InvalidFormat, message) }
    pub fn invalid_type(message: impl Into<String>) -> Self { Self::grid(ErrorCode::InvalidType, message) }
    pub fn bad_filter(message: impl Into<String>) -> Self { Self::grid(ErrorCode::BadFilter, message) }
    pub fn validation(message: impl Into<String>) -> Self { Self::grid(ErrorCode::ValidationFailed, message) }
    pub fn constraint(message: impl Into<String>) -> Self { Self::grid(ErrorCode::ConstraintViolation, message) }
    pub fn timed_out(message: impl Into<String>) -> Self { Self::grid(ErrorCode::TimedOut, message) }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Grid { code, .. }  => *code,
            AppError::JsonRejection(_)   => ErrorCode::InvalidFormat,
            _                            => ErrorCode::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::JsonRejection(r) => r.status(),
            other                      => other.code().status_code(),
        }
    }

    /// Message safe to hand to a caller; storage and runtime details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Grid { message, .. } => message.clone(),
            AppError::JsonRejection(rej)   => rej.body_text(),
            _                              => "internal error".to_string(),
        }
    }

    /// Collapses storage/runtime failures into `Internal`, keeping domain failures intact.
    pub fn normalize(self) -> Self {
        match self {
            AppError::Grid { .. } | AppError::JsonRejection(_) => self,
            other => {
                crate::error!("Internal failure: {}", other);
                AppError::grid(ErrorCode::Internal, other.public_message())
            }
        }
    }
}

impl<T> From<PoisonError<T>> for AppError
{
    fn from(e: PoisonError<T>) -> Self {
        AppError::Custom(format!("Poison error: {:?}", e.to_string()))
    }
}

impl From<AppError> for axum::Error {
    fn from(val: AppError) -> Self {
        axum::Error::new(val.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_codes_map_to_distinct_statuses() {
        assert_eq!(AppError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::bad_filter("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::constraint("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::timed_out("x").status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn normalize_hides_storage_details() {
        let err = AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")).normalize();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.public_message(), "internal error");

        let domain = AppError::validation("baskv out of range").normalize();
        assert_eq!(domain.code(), ErrorCode::ValidationFailed);
        assert_eq!(domain.public_message(), "baskv out of range");
    }
}
