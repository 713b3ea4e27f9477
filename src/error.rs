//! Structured error types for core operations.

use crate::types::{TaskId, TaskState};
use serde::Serialize;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    InvalidTransition,

    // Graph errors
    CycleDetected,

    // Not found errors
    NotFound,

    // Internal errors
    PersistenceError,
    SerializationError,
    ConfigError,
}

/// Errors raised by the task core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("cannot move task from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("adding dependency {blocked} blocked by {blocking} would create a cycle")]
    CycleDetected { blocked: TaskId, blocking: TaskId },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("task {blocked} is not blocked by task {blocking}")]
    DependencyNotFound { blocked: TaskId, blocking: TaskId },

    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(#[from] refinery::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn task_not_found(id: TaskId) -> Self {
        Self::NotFound { kind: "task", id }
    }

    /// Stable code for the presentation layer.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation { .. } => ErrorCode::ValidationError,
            Error::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Error::CycleDetected { .. } => ErrorCode::CycleDetected,
            Error::NotFound { .. } | Error::DependencyNotFound { .. } => ErrorCode::NotFound,
            Error::Persistence(_) | Error::Migration(_) => ErrorCode::PersistenceError,
            Error::Serialization(_) => ErrorCode::SerializationError,
            Error::Config(_) => ErrorCode::ConfigError,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Error::CycleDetected { .. })
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
