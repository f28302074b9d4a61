//! Script errors.

use lime_common::error::ArchiveError;
use thiserror::Error;

/// Errors raised while loading or running game scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Lua compile or runtime error (message includes the traceback)
    #[error("{0}")]
    Lua(#[from] mlua::Error),

    /// Script source could not be read
    #[error("Failed to load script: {0}")]
    Content(#[from] ArchiveError),
}

/// Result type alias for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
