//! Fusing a game onto the engine executable.
//!
//! The output is a copy of the engine binary followed by a zip of the game
//! directory. Launching it runs the game with no loose files needed.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use lime_common::error::{ArchiveError, ArchiveResult};
use tracing::{debug, info};

use crate::writer::ArchiveWriter;
use crate::zip::CompressionMethod;

/// Result of a fuse operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuseSummary {
    /// Size of the engine executable (and thus the archive base offset)
    pub engine_bytes: u64,
    /// Number of game files packed
    pub files: usize,
    /// Total uncompressed size of the game files
    pub content_bytes: u64,
}

/// Write `output` as `engine_exe` followed by an archive of `game_dir`.
pub fn fuse_directory(
    engine_exe: impl AsRef<Path>,
    game_dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> ArchiveResult<FuseSummary> {
    let engine_exe = engine_exe.as_ref();
    let game_dir = game_dir.as_ref();
    let output = output.as_ref();

    if !game_dir.is_dir() {
        return Err(ArchiveError::NotFound(game_dir.display().to_string()));
    }
    if same_file(engine_exe, output) {
        return Err(ArchiveError::InvalidPath(format!(
            "output {} would overwrite the engine",
            output.display()
        )));
    }

    let files = collect_files(game_dir)?;

    let mut out = BufWriter::new(File::create(output)?);
    let engine_bytes = io::copy(&mut File::open(engine_exe)?, &mut out)?;

    let mut writer = ArchiveWriter::new(out)?;
    let mut content_bytes = 0u64;
    for (name, path) in &files {
        let data = fs::read(path)?;
        content_bytes += data.len() as u64;
        writer.add_file(name, &data, CompressionMethod::Deflated)?;
        debug!("Packed {name} ({} bytes)", data.len());
    }

    let mut out = writer.finish()?;
    out.flush()?;
    drop(out);

    // Keep the engine's mode bits so the fused output stays executable.
    fs::set_permissions(output, fs::metadata(engine_exe)?.permissions())?;

    info!(
        "Fused {} files ({} bytes) onto {}",
        files.len(),
        content_bytes,
        output.display()
    );

    Ok(FuseSummary {
        engine_bytes,
        files: files.len(),
        content_bytes,
    })
}

/// All files under `root` as (`/`-separated relative name, host path), sorted by name.
pub fn collect_files(root: &Path) -> ArchiveResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    walk(root, "", &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn walk(dir: &Path, prefix: &str, out: &mut Vec<(String, PathBuf)>) -> ArchiveResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            return Err(ArchiveError::InvalidPath(entry.path().display().to_string()));
        };
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), &relative, out)?;
        } else {
            out.push((relative, entry.path()));
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
