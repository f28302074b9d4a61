//! # lime2d Archive
//!
//! Game content access for lime2d.
//!
//! Content can come from three places:
//! - a zip archive fused onto the end of the engine executable
//! - a standalone zip archive (`.zip`, `.lime`)
//! - loose files in a directory
//!
//! [`Vfs`] stacks any number of these behind one path namespace, so scripts
//! and the engine never need to know where a file physically lives.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod fuse;
pub mod fused;
pub mod vfs;
pub mod writer;
pub mod zip;

pub use fuse::{fuse_directory, FuseSummary};
pub use fused::FusedArchive;
pub use lime_common::error::{ArchiveError, ArchiveResult};
pub use vfs::{MountInfo, MountKind, Vfs};
pub use writer::ArchiveWriter;
pub use zip::{CompressionMethod, ZipEntry, ZipIndex};
