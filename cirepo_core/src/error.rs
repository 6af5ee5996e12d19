//! Error types for cirepo_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using cirepo_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by external collaborators (object database, filters).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during repository operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Caller passed an invalid argument, e.g. an empty relative path.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The resolved absolute path exceeds the platform or configured limits.
    #[error("Path is too long: {path}")]
    PathTooLong {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content could not be decoded as text.
    #[error("File {path} does not contain valid text")]
    InvalidText { path: String },

    /// XML document could not be written or parsed.
    #[error("XML error: {reason}")]
    Xml { reason: String },

    /// JSON metadata could not be written or parsed.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Repository configuration is missing or invalid.
    #[error("Invalid repository configuration at {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// Unsupported hash algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Processing of a single object failed unexpectedly.
    #[error("Failed to process object {object_type} with ID {object_id}: {source}")]
    Serialization {
        object_type: String,
        object_id: i64,
        #[source]
        source: BoxError,
    },

    /// The object database failed outside of a delete attempt.
    #[error("Object database error: {reason}")]
    Database { reason: String },

    /// The operation observed a cancellation request.
    #[error("Operation cancelled after {processed} processed objects")]
    Cancelled { processed: usize },
}

impl Error {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a PathTooLong error wrapping the original failure.
    pub fn path_too_long(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PathTooLong {
            path: path.into(),
            source,
        }
    }

    /// Create an InvalidText error.
    pub fn invalid_text(path: impl Into<String>) -> Self {
        Error::InvalidText { path: path.into() }
    }

    /// Create an Xml error.
    pub fn xml(reason: impl Into<String>) -> Self {
        Error::Xml {
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create a Serialization error for one object.
    pub fn serialization(
        object_type: impl Into<String>,
        object_id: i64,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Serialization {
            object_type: object_type.into(),
            object_id,
            source: source.into(),
        }
    }

    /// Create a Database error.
    pub fn database(reason: impl Into<String>) -> Self {
        Error::Database {
            reason: reason.into(),
        }
    }

    /// Create a Cancelled error.
    pub fn cancelled(processed: usize) -> Self {
        Error::Cancelled { processed }
    }

    /// Returns true for argument validation failures.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument { .. })
    }

    /// Returns true when the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
