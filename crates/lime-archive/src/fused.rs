//! Fused archives.
//!
//! A fused archive is a zip appended to the engine executable, which turns
//! the engine into a self-contained game. The same type also serves
//! standalone `.zip`/`.lime` files, which are simply archives with a base
//! offset of zero.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use lime_common::error::{ArchiveError, ArchiveResult};
use lime_common::vpath;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::zip::{self, ZipEntry, ZipIndex};

/// Read-only view of a zip archive backed by a file on disk.
pub struct FusedArchive {
    /// File the archive was read from
    source: PathBuf,
    /// Offset of the archive inside `source`
    base_offset: u64,
    /// Files keyed by normalized path
    files: BTreeMap<String, ZipEntry>,
    /// Explicit and implied directories (always contains the root `""`)
    dirs: BTreeSet<String>,
    /// Shared handle, seeks are serialized
    file: Mutex<File>,
}

impl std::fmt::Debug for FusedArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusedArchive")
            .field("source", &self.source)
            .field("base_offset", &self.base_offset)
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

impl FusedArchive {
    /// Open the archive at the end of `path`.
    ///
    /// Returns `Ok(None)` if the file has no zip trailer (an executable
    /// without fused content).
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Option<Self>> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let Some(index) = ZipIndex::parse(&mut file)? else {
            debug!("No archive trailer in {}", path.display());
            return Ok(None);
        };

        let archive = Self::from_index(path, index, file);
        info!(
            "Opened archive {} ({} files, base offset {})",
            path.display(),
            archive.files.len(),
            archive.base_offset
        );
        Ok(Some(archive))
    }

    /// Open a file that must be an archive.
    pub fn open_standalone(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref();
        Self::open(path)?.ok_or_else(|| ArchiveError::NotAnArchive(path.display().to_string()))
    }

    fn from_index(source: &Path, index: ZipIndex, file: File) -> Self {
        let mut files = BTreeMap::new();
        let mut dirs = BTreeSet::new();
        dirs.insert(String::new());

        for entry in index.entries {
            let Ok(name) = vpath::normalize(&entry.name) else {
                warn!("Skipping archive entry with unsafe path: {}", entry.name);
                continue;
            };
            if name.is_empty() {
                continue;
            }

            let mut ancestor = vpath::parent(&name);
            while let Some(dir) = ancestor {
                if !dirs.insert(dir.to_string()) {
                    break;
                }
                ancestor = vpath::parent(dir);
            }

            if entry.is_dir() {
                dirs.insert(name);
            } else if files.contains_key(&name) {
                warn!("Duplicate archive entry {name}, keeping the first");
            } else {
                files.insert(name, entry);
            }
        }

        Self {
            source: source.to_path_buf(),
            base_offset: index.base_offset,
            files,
            dirs,
            file: Mutex::new(file),
        }
    }

    /// File the archive was read from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Offset of the archive inside its source file.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns true if the archive is appended to other data.
    #[must_use]
    pub fn is_fused(&self) -> bool {
        self.base_offset > 0
    }

    /// Number of files (directories excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the archive holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Normalized paths of all files, sorted.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Entry for a normalized path.
    #[must_use]
    pub fn entry(&self, normal: &str) -> Option<&ZipEntry> {
        self.files.get(normal)
    }

    /// Returns true if `normal` is a file in the archive.
    #[must_use]
    pub fn contains(&self, normal: &str) -> bool {
        self.files.contains_key(normal)
    }

    /// Returns true if `normal` is a directory in the archive.
    #[must_use]
    pub fn is_dir(&self, normal: &str) -> bool {
        self.dirs.contains(normal)
    }

    /// Read a file by normalized path.
    pub fn read(&self, normal: &str) -> ArchiveResult<Vec<u8>> {
        let Some(entry) = self.files.get(normal) else {
            if self.is_dir(normal) {
                return Err(ArchiveError::IsDirectory(normal.to_string()));
            }
            return Err(ArchiveError::NotFound(normal.to_string()));
        };

        let mut file = self.file.lock();
        zip::read_entry(&mut *file, entry)
    }

    /// Names of the immediate children of a directory, sorted.
    #[must_use]
    pub fn list_dir(&self, normal: &str) -> Vec<String> {
        if !self.is_dir(normal) {
            return Vec::new();
        }

        let children: BTreeSet<&str> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter(|path| !path.is_empty() && vpath::parent(path) == Some(normal))
            .map(|path| vpath::file_name(path))
            .collect();

        children.into_iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ArchiveWriter;
    use crate::zip::CompressionMethod;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_fused(dir: &TempDir, prefix: &[u8]) -> PathBuf {
        let path = dir.path().join("engine.bin");
        let mut file = File::create(&path).expect("create");
        file.write_all(prefix).expect("prefix");
        let mut writer = ArchiveWriter::new(file).expect("writer");
        writer
            .add_file("main.lua", b"lime.log('hello')", CompressionMethod::Deflated)
            .expect("main");
        writer
            .add_file("gfx/ui/button.png", &[7; 300], CompressionMethod::Deflated)
            .expect("button");
        writer
            .add_file("gfx/hero.png", &[1, 2, 3, 4], CompressionMethod::Stored)
            .expect("hero");
        writer.add_directory("sfx").expect("sfx");
        writer.finish().expect("finish");
        path
    }

    #[test]
    fn test_open_fused_executable() {
        let dir = TempDir::new().expect("create temp dir");
        let path = write_fused(&dir, b"MZ fake executable bytes");

        let archive = FusedArchive::open(&path)
            .expect("open")
            .expect("archive present");
        assert!(archive.is_fused());
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.read("gfx/hero.png").expect("read"), vec![1, 2, 3, 4]);
        assert_eq!(
            archive.read("main.lua").expect("read"),
            b"lime.log('hello')".to_vec()
        );
    }

    #[test]
    fn test_plain_file_has_no_archive() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("plain.exe");
        std::fs::write(&path, vec![0x90; 4096]).expect("write");

        assert!(FusedArchive::open(&path).expect("open").is_none());
        let err = FusedArchive::open_standalone(&path).expect_err("must fail");
        assert!(matches!(err, ArchiveError::NotAnArchive(_)));
    }

    #[test]
    fn test_directories_are_implied() {
        let dir = TempDir::new().expect("create temp dir");
        let archive = FusedArchive::open_standalone(write_fused(&dir, &[])).expect("open");

        assert!(!archive.is_fused());
        assert!(archive.is_dir(""));
        assert!(archive.is_dir("gfx"));
        assert!(archive.is_dir("gfx/ui"));
        assert!(archive.is_dir("sfx"));
        assert!(!archive.contains("gfx"));
        assert!(matches!(
            archive.read("gfx"),
            Err(ArchiveError::IsDirectory(_))
        ));
        assert!(matches!(
            archive.read("missing.txt"),
            Err(ArchiveError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_dir() {
        let dir = TempDir::new().expect("create temp dir");
        let archive = FusedArchive::open_standalone(write_fused(&dir, &[])).expect("open");

        assert_eq!(archive.list_dir(""), vec!["gfx", "main.lua", "sfx"]);
        assert_eq!(archive.list_dir("gfx"), vec!["hero.png", "ui"]);
        assert!(archive.list_dir("sfx").is_empty());
        assert!(archive.list_dir("nope").is_empty());
    }
}
