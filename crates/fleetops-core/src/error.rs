//! Error types for FleetOps Core

use thiserror::Error;

/// Result type alias using FleetOps Error
pub type Result<T> = std::result::Result<T, Error>;

/// FleetOps error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid task parameters: {0}")]
    Validation(String),

    #[error("Subtask failed: {0}")]
    SubtaskFailure(String),

    #[error("Task store is inconsistent: {0}")]
    StoreInconsistency(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn task_not_found(task_id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("task {}", task_id))
    }

    pub fn subtask_failure(message: impl Into<String>) -> Self {
        Self::SubtaskFailure(message.into())
    }
}
