//! Error types and handling for nufeed-core operations.
//!
//! This module provides a single error type covering every failure the feed
//! engine can produce. Errors are categorized for easier handling: push
//! validation failures surface descriptive messages naming the offending
//! package identity, while background-task failures are logged and swallowed
//! at their call sites rather than propagated.

use thiserror::Error;

/// The main error type for nufeed-core operations.
///
/// All public functions in nufeed-core return `Result<T, Error>` for
/// consistent error handling. The error type includes automatic conversion
/// from common standard library errors.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers file system operations like reading/writing archives, creating
    /// directories, checking attributes. The underlying `std::io::Error` is
    /// preserved to maintain detailed error information.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing operation failed.
    ///
    /// Occurs when a version string, dependency range, framework moniker, or
    /// manifest XML cannot be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A package archive is malformed or inadmissible.
    ///
    /// Covers unreadable zip containers, missing or duplicate manifests, and
    /// pushes rejected by policy (for example a symbols package when symbols
    /// packages are disabled).
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// A push targeted an identity that already exists.
    ///
    /// Raised only when overwriting on push is disabled. The message names
    /// the conflicting identity so the caller can report it.
    #[error("Package {id} {version} already exists")]
    DuplicatePackage {
        /// Package id of the conflicting identity.
        id: String,
        /// Normalized version of the conflicting identity.
        version: String,
    },

    /// A query was constructed with inconsistent arguments.
    ///
    /// For example an update check whose id and constraint sequences differ
    /// in length.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage operation failed.
    ///
    /// Covers expanded-store operations beyond basic file I/O, such as
    /// canonical path resolution and hash sidecar management.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization or deserialization failed.
    ///
    /// Snapshot load failures are handled separately (the file is deleted and
    /// the cache starts empty); this variant covers write-side failures.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The operation was cancelled before completion.
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::InvalidPackage(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Sharing violations during drop-folder ingestion are the canonical
    /// recoverable case: the file is still being copied and a later scan
    /// will pick it up.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::PermissionDenied
            ),
            Self::Cancelled => true,
            _ => false,
        }
    }

    /// Get the error category as a string identifier for logging and metrics.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Parse(_) => "parse",
            Self::InvalidPackage(_) => "invalid_package",
            Self::DuplicatePackage { .. } => "duplicate_package",
            Self::InvalidQuery(_) => "invalid_query",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::Serialization(_) => "serialization",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
