//! Error types for qaforge
//!
//! Provides:
//! - Distinct error types for each pipeline failure mode
//! - Machine-readable error codes
//! - Request vs. upstream classification for the CLI exit status

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request errors (1xxx)
    InvalidRequest,
    ValidationError,
    UnknownEvolutionStep,

    // Data errors (4xxx)
    MissingChunk,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // Generative model errors (8xxx)
    UpstreamError,
    LlmError,
    MalformedReply,
    EmptyReply,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    IoError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 1001,
            ErrorCode::ValidationError => 1002,
            ErrorCode::UnknownEvolutionStep => 1003,

            ErrorCode::MissingChunk => 4001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::LlmError => 8002,
            ErrorCode::MalformedReply => 8003,
            ErrorCode::EmptyReply => 8004,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::IoError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Request errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Evolution step '{step}' is not implemented")]
    UnknownEvolutionStep { step: String },

    // Data errors
    #[error("Chunk {chunk_id} referenced by query {query_id} is not in the corpus")]
    MissingChunk { query_id: String, chunk_id: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Generative model errors
    #[error("Generative model error: {message}")]
    Llm { message: String },

    #[error("Malformed {stage} reply: {message}")]
    MalformedReply { stage: String, message: String },

    #[error("Generative model returned no replies")]
    EmptyReply,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Shorthand for a malformed reply raised by a named stage
    pub fn malformed(stage: &str, message: impl Into<String>) -> Self {
        AppError::MalformedReply {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::UnknownEvolutionStep { .. } => ErrorCode::UnknownEvolutionStep,
            AppError::MissingChunk { .. } => ErrorCode::MissingChunk,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Llm { .. } => ErrorCode::LlmError,
            AppError::MalformedReply { .. } => ErrorCode::MalformedReply,
            AppError::EmptyReply => ErrorCode::EmptyReply,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Io(_) => ErrorCode::IoError,
        }
    }

    /// Errors raised by a caller's request before any work is done
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidRequest { .. }
                | AppError::Validation { .. }
                | AppError::UnknownEvolutionStep { .. }
                | AppError::Configuration { .. }
        )
    }

    /// Errors that originate at a boundary call (store or generative model)
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::DatabaseConnection { .. }
                | AppError::Llm { .. }
                | AppError::MalformedReply { .. }
                | AppError::EmptyReply
                | AppError::HttpClient(_)
        )
    }

    /// Process exit status the CLI reports for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_request_error() {
            2
        } else if self.is_upstream() {
            3
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::UnknownEvolutionStep { step: "poetic_evolution".into() };
        assert_eq!(err.code(), ErrorCode::UnknownEvolutionStep);
        assert_eq!(err.code().as_code(), 1003);
        assert!(err.is_request_error());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_malformed_reply_is_upstream() {
        let err = AppError::malformed("decomposition", "expected a JSON object");
        assert_eq!(err.code(), ErrorCode::MalformedReply);
        assert!(err.is_upstream());
        assert!(!err.is_request_error());
        assert_eq!(
            err.to_string(),
            "Malformed decomposition reply: expected a JSON object"
        );
    }

    #[test]
    fn test_internal_error_exit_code() {
        let err = AppError::Internal { message: "Something went wrong".into() };
        assert_eq!(err.exit_code(), 1);
    }
}
