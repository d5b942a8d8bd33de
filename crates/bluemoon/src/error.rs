//! Error types for bluemoon.
//!
//! This module defines all error types used throughout the bluemoon crate.
//! Domain variants (`NotFound`, `Validation`, `Conflict`, `InvalidTransition`,
//! `Import`) carry messages safe to return to API clients; the rest are
//! infrastructure failures that are logged and reported generically.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The main error type for bluemoon operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Domain Errors ===
    /// The requested record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record, e.g. `"apartment"`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: i64,
    },

    /// Input failed a business rule.
    #[error("{message}")]
    Validation {
        /// Description of the rule that was broken.
        message: String,
    },

    /// The change collides with existing data.
    #[error("{message}")]
    Conflict {
        /// Description of the collision.
        message: String,
    },

    /// A status change that the state machine does not allow.
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Kind of record.
        entity: &'static str,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Master-data import rejected one or more rows.
    #[error("import rejected: {message}")]
    Import {
        /// Summary of the rejection.
        message: String,
        /// Every row that failed validation.
        failures: Vec<RowFailure>,
    },

    // === Server Errors ===
    /// The HTTP server could not start or failed while running.
    #[error("server error: {0}")]
    Server(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A single rejected row of a master-data import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    /// Section of the document (`apartments`, `residents`, `vehicles`).
    pub section: &'static str,
    /// Zero-based index of the row within its section.
    pub row: usize,
    /// Why the row was rejected.
    pub message: String,
}

/// A specialized Result type for bluemoon operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an invalid status transition error.
    #[must_use]
    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new server error.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    /// Check if this error is caused by the caller rather than the system.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Validation { .. }
                | Self::Conflict { .. }
                | Self::InvalidTransition { .. }
                | Self::Import { .. }
        )
    }

    /// Check if this error is a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Map a SQLite unique-constraint violation to [`Error::Conflict`].
///
/// Any other error is passed through unchanged.
pub(crate) fn map_unique(err: rusqlite::Error, message: impl FnOnce() -> String) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(ref code, _)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Error::conflict(message())
        }
        other => Error::DatabaseQuery(other),
    }
}
