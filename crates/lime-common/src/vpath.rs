//! Virtual path rules.
//!
//! Every path handed to the virtual filesystem is normalized into a
//! `/`-separated, root-relative form before lookup. The empty string is the
//! root directory.

use crate::error::{ArchiveError, ArchiveResult};

/// Normalizes a virtual path.
///
/// - `\` is treated as a separator
/// - empty and `.` components are dropped
/// - `..` removes the previous component
///
/// Fails with [`ArchiveError::InvalidPath`] if `..` would climb above the root.
pub fn normalize(path: &str) -> ArchiveResult<String> {
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {},
            ".." => {
                if parts.pop().is_none() {
                    return Err(ArchiveError::InvalidPath(path.to_string()));
                }
            },
            other => parts.push(other),
        }
    }

    Ok(parts.join("/"))
}

/// Returns the parent of a normalized path (`None` for the root).
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(head, _)| head))
}

/// Returns the final component of a normalized path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, tail)| tail)
}
