use std::time::Duration;

use thiserror::Error;

use crate::types::IndexHeader;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid chunk config: {0}")]
    InvalidChunkConfig(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Index is empty: search called before any successful build")]
    EmptyIndex,

    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index version mismatch: index built with {expected}, got {actual}")]
    IndexVersionMismatch { expected: IndexHeader, actual: IndexHeader },

    #[error("Invalid index entry: {0}")]
    InvalidIndexEntry(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation failed: {message}")]
    Generation { message: String, retryable: bool },

    #[error("Ingestion aborted")]
    Aborted,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Generation { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
