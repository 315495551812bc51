//! Error types for bistro.
//!
//! Every fallible operation in the crate returns [`Result`]. Failures are
//! meant to be shown to the user inline, so each variant renders a
//! human-readable message through [`Error::user_message`].

use std::path::PathBuf;
use thiserror::Error;

use crate::auth::AuthErrorCode;

/// The main error type for bistro operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Domain Errors ===
    /// The identity provider rejected a request; `message` is already mapped
    /// to the user-facing text for the operation that failed.
    #[error("{message}")]
    Auth {
        /// The provider's error code.
        code: AuthErrorCode,
        /// User-facing message.
        message: String,
    },

    /// Client-side input validation failed.
    #[error("{message}")]
    Validation {
        /// The input field that failed validation.
        field: &'static str,
        /// User-facing message.
        message: String,
    },

    /// The operation requires a signed-in user.
    #[error("{message}")]
    NotAuthenticated {
        /// User-facing message naming what the user tried to do.
        message: String,
    },

    /// A requested document does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A document store operation failed.
    #[error("{0}")]
    Store(String),

    // === Storage Errors ===
    /// Failed to open or create a database.
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

/// A specialized Result type for bistro operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new document store error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a new validation error for the given field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a "not signed in" error.
    #[must_use]
    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::NotAuthenticated {
            message: message.into(),
        }
    }

    /// Create a new not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Collapse a storage-level failure into [`Error::Store`], keeping its
    /// message. Domain errors pass through unchanged.
    #[must_use]
    pub fn into_store(self) -> Self {
        match self {
            Self::DatabaseOpen { .. }
            | Self::DatabaseQuery(_)
            | Self::DatabaseMigration { .. }
            | Self::Io(_)
            | Self::DirectoryCreate { .. }
            | Self::Json(_)
            | Self::Internal(_) => Self::Store(self.user_message()),
            other => other,
        }
    }

    /// Check if this error means nobody is signed in.
    #[must_use]
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated { .. })
    }

    /// Check if this error means a document was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error came from client-side validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The message to show the user.
    ///
    /// Store-level failures of any kind (SQL, I/O, JSON) are collapsed into a
    /// single message that passes the underlying text through.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::DatabaseQuery(err) => err.to_string(),
            Self::Json(err) => err.to_string(),
            other => other.to_string(),
        }
    }
}
