//! Virtual filesystem.
//!
//! Stacks archives and directories behind a single path namespace. Mounts are
//! searched from the most recently mounted down, so later mounts shadow
//! earlier ones:
//!
//! ```text
//! [top]    game selected at startup (dir or .zip)
//!          archive fused onto the executable
//! [bottom] loose files beside the executable
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lime_common::error::{ArchiveError, ArchiveResult};
use lime_common::vpath;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::fused::FusedArchive;

/// Kind of content behind a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// Loose files in a directory
    Directory,
    /// Zip archive (fused or standalone)
    Archive,
}

/// Description of a mount, for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Human readable label (source path)
    pub label: String,
    /// Kind of mount
    pub kind: MountKind,
}

enum MountSource {
    Directory(PathBuf),
    Archive(FusedArchive),
}

struct Mount {
    label: String,
    source: MountSource,
}

impl Mount {
    fn info(&self) -> MountInfo {
        MountInfo {
            label: self.label.clone(),
            kind: match self.source {
                MountSource::Directory(_) => MountKind::Directory,
                MountSource::Archive(_) => MountKind::Archive,
            },
        }
    }

    fn is_file(&self, normal: &str) -> bool {
        match &self.source {
            MountSource::Directory(root) => !normal.is_empty() && host_path(root, normal).is_file(),
            MountSource::Archive(archive) => archive.contains(normal),
        }
    }

    fn is_dir(&self, normal: &str) -> bool {
        match &self.source {
            MountSource::Directory(root) => host_path(root, normal).is_dir(),
            MountSource::Archive(archive) => archive.is_dir(normal),
        }
    }

    fn read(&self, normal: &str) -> ArchiveResult<Vec<u8>> {
        match &self.source {
            MountSource::Directory(root) => Ok(fs::read(host_path(root, normal))?),
            MountSource::Archive(archive) => archive.read(normal),
        }
    }

    fn list_dir(&self, normal: &str, out: &mut BTreeSet<String>) {
        match &self.source {
            MountSource::Directory(root) => {
                let Ok(entries) = fs::read_dir(host_path(root, normal)) else {
                    return;
                };
                out.extend(
                    entries
                        .filter_map(Result::ok)
                        .filter_map(|e| e.file_name().into_string().ok()),
                );
            },
            MountSource::Archive(archive) => out.extend(archive.list_dir(normal)),
        }
    }
}

fn host_path(root: &Path, normal: &str) -> PathBuf {
    if normal.is_empty() {
        root.to_path_buf()
    } else {
        root.join(normal)
    }
}

/// Layered read-only filesystem over archives and directories.
#[derive(Default)]
pub struct Vfs {
    mounts: RwLock<Vec<Arc<Mount>>>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs").field("mounts", &self.mounts()).finish()
    }
}

impl Vfs {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a directory of loose files on top of the stack.
    pub fn mount_dir(&self, dir: impl AsRef<Path>) -> ArchiveResult<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ArchiveError::NotFound(dir.display().to_string()));
        }

        let label = dir.display().to_string();
        info!("Mounted directory {label}");
        self.push(Mount {
            label,
            source: MountSource::Directory(dir.to_path_buf()),
        });
        Ok(())
    }

    /// Mount an opened archive on top of the stack.
    pub fn mount_archive(&self, archive: FusedArchive) {
        let label = archive.source().display().to_string();
        info!(
            "Mounted {} archive {label} ({} files)",
            if archive.is_fused() { "fused" } else { "standalone" },
            archive.len()
        );
        self.push(Mount {
            label,
            source: MountSource::Archive(archive),
        });
    }

    /// Open a standalone archive file and mount it.
    pub fn mount_archive_file(&self, path: impl AsRef<Path>) -> ArchiveResult<()> {
        let archive = FusedArchive::open_standalone(path)?;
        self.mount_archive(archive);
        Ok(())
    }

    /// Remove the topmost mount with the given label.
    pub fn unmount(&self, label: &str) -> bool {
        let mut mounts = self.mounts.write();
        if let Some(pos) = mounts.iter().rposition(|m| m.label == label) {
            mounts.remove(pos);
            debug!("Unmounted {label}");
            true
        } else {
            false
        }
    }

    /// Mounts from top (searched first) to bottom.
    #[must_use]
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts.read().iter().rev().map(|m| m.info()).collect()
    }

    fn push(&self, mount: Mount) {
        self.mounts.write().push(Arc::new(mount));
    }

    /// Snapshot of the stack, top first, so IO never runs under the lock.
    fn snapshot(&self) -> Vec<Arc<Mount>> {
        self.mounts.read().iter().rev().cloned().collect()
    }

    /// Returns true if `path` names a file in any mount.
    #[must_use]
    pub fn is_file(&self, path: &str) -> bool {
        vpath::normalize(path).is_ok_and(|normal| self.snapshot().iter().any(|m| m.is_file(&normal)))
    }

    /// Returns true if `path` names a file in the topmost mount alone.
    #[must_use]
    pub fn top_is_file(&self, path: &str) -> bool {
        let top = self.mounts.read().last().cloned();
        match (vpath::normalize(path), top) {
            (Ok(normal), Some(mount)) => mount.is_file(&normal),
            _ => false,
        }
    }

    /// Returns true if `path` names a directory in any mount.
    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        vpath::normalize(path).is_ok_and(|normal| self.snapshot().iter().any(|m| m.is_dir(&normal)))
    }

    /// Returns true if `path` names a file or directory.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    /// Mount that serves `path`, if any.
    pub fn resolve(&self, path: &str) -> ArchiveResult<Option<MountInfo>> {
        let normal = vpath::normalize(path)?;
        Ok(self
            .snapshot()
            .iter()
            .find(|m| m.is_file(&normal) || m.is_dir(&normal))
            .map(|m| m.info()))
    }

    /// Read a whole file from the topmost mount that has it.
    pub fn read(&self, path: &str) -> ArchiveResult<Vec<u8>> {
        let normal = vpath::normalize(path)?;
        let mounts = self.snapshot();

        if let Some(mount) = mounts.iter().find(|m| m.is_file(&normal)) {
            return mount.read(&normal);
        }
        if mounts.iter().any(|m| m.is_dir(&normal)) {
            return Err(ArchiveError::IsDirectory(normal));
        }
        Err(ArchiveError::NotFound(normal))
    }

    /// Read a whole file as UTF-8 text.
    pub fn read_to_string(&self, path: &str) -> ArchiveResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| ArchiveError::InvalidUtf8(path.to_string()))
    }

    /// Merged, sorted listing of a directory across all mounts.
    pub fn list_dir(&self, path: &str) -> ArchiveResult<Vec<String>> {
        let normal = vpath::normalize(path)?;
        let mut names = BTreeSet::new();
        for mount in self.snapshot() {
            mount.list_dir(&normal, &mut names);
        }
        Ok(names.into_iter().collect())
    }
}
