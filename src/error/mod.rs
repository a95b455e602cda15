//! Error types and Result aliases for navhist.
//!
//! All public functions return `Result<T, Error>` or `Result<T>`.
//! Initialization failures carry enough detail to be mapped onto an
//! [`InitStatus`] for callers that only care about the outcome class.

use thiserror::Error;

/// Result type alias using navhist's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for navhist operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database/storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Record not found.
    #[error("not found: {entity} with id '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// On-disk schema predates the oldest version we can migrate from.
    #[error("history database version {found} is too old to migrate (oldest supported: {oldest})")]
    TooOld { found: i32, oldest: i32 },

    /// On-disk schema was written by a newer release.
    #[error("history database version {found} is newer than supported version {current}")]
    TooNew { found: i32, current: i32 },

    /// The file could not be razed.
    #[error("raze failed: {0}")]
    Raze(String),
}

/// Outcome class of opening a history database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Database is open and at the current version.
    Ok,
    /// Data is too old to migrate; permanent and user-visible.
    TooOld,
    /// Data was written by newer code.
    TooNew,
    /// Generic open, I/O or migration failure.
    Failure,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error as an initialization outcome.
    #[must_use]
    pub const fn init_status(&self) -> InitStatus {
        match self {
            Self::Storage(StorageError::TooOld { .. }) => InitStatus::TooOld,
            Self::Storage(StorageError::TooNew { .. }) => InitStatus::TooNew,
            _ => InitStatus::Failure,
        }
    }
}

impl StorageError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests;
