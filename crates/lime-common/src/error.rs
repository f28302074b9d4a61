//! Error types for lime2d content access.

use thiserror::Error;

/// Errors raised while reading archives or resolving virtual paths.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No mount provides the requested path
    #[error("File not found: {0}")]
    NotFound(String),

    /// File has no zip trailer
    #[error("Not a zip archive: {0}")]
    NotAnArchive(String),

    /// Path escapes the virtual root or is otherwise malformed
    #[error("Invalid virtual path: {0}")]
    InvalidPath(String),

    /// Archive structure is damaged
    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    /// Archive uses a feature this reader does not implement
    #[error("Unsupported archive feature: {0}")]
    Unsupported(String),

    /// Path names a directory where a file was expected
    #[error("Is a directory: {0}")]
    IsDirectory(String),

    /// File contents are not valid UTF-8
    #[error("File is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Result type alias for archive and filesystem operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
