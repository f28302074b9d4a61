//! Startup selection.
//!
//! Decides what to run from the files the engine was launched with (for
//! example a folder dropped onto the executable):
//!
//! | first startup file         | mounted            | entry script        |
//! |----------------------------|--------------------|---------------------|
//! | `game/main.lua`            | `game/`            | `main.lua`          |
//! | `game/` (directory)        | `game/`            | `entry_script`      |
//! | `game.zip` / `game.lime`   | the archive        | `entry_script`      |
//! | none                       | already mounted    | `entry_script`      |

use std::fs;
use std::path::{Path, PathBuf};

use lime_archive::{ArchiveError, Vfs};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::screen::ErrorScreen;

/// Errors that prevent a game from being selected.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Startup file does not exist
    #[error("Startup file not found: {0}")]
    NotFound(PathBuf),

    /// Startup file is neither a script, a directory, nor an archive
    #[error("Don't know how to run {0}")]
    UnsupportedFile(PathBuf),

    /// Target has no entry script
    #[error("{entry} not found in {target}")]
    MissingEntry {
        /// Entry script that was looked for
        entry: String,
        /// Target that was searched
        target: String,
    },

    /// Target could not be mounted
    #[error("Failed to open {path}: {source}")]
    Mount {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: ArchiveError,
    },

    /// Nothing was given and nothing is bundled
    #[error("No game to run")]
    NoGame {
        /// Bundled example games found beside the executable
        examples: Vec<String>,
    },
}

impl StartupError {
    /// Error screen describing this failure.
    #[must_use]
    pub fn to_screen(&self) -> ErrorScreen {
        match self {
            Self::NoGame { examples } => {
                let mut details = vec![
                    "Drop a .lua file, a game folder, or a .zip onto the executable.".to_string(),
                ];
                if !examples.is_empty() {
                    details.push("Bundled examples:".to_string());
                    details.extend(examples.iter().map(|name| format!("  {name}")));
                }
                ErrorScreen::new("No Game", &self.to_string()).with_details(details)
            },
            _ => ErrorScreen::new("Startup Error", &self.to_string()),
        }
    }
}

/// What the first startup file turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupTarget {
    /// A single script; its directory becomes the game root
    Script(PathBuf),
    /// A game directory
    Directory(PathBuf),
    /// A standalone archive
    Archive(PathBuf),
    /// Content already mounted at boot (fused archive or exe dir)
    Bundled,
}

/// Classify the startup files.
pub fn classify(files: &[PathBuf], config: &EngineConfig) -> Result<StartupTarget, StartupError> {
    let Some(first) = files.first() else {
        return Ok(StartupTarget::Bundled);
    };
    if files.len() > 1 {
        info!(
            "{} extra startup files passed to the game as arguments",
            files.len() - 1
        );
    }

    if first.is_dir() {
        return Ok(StartupTarget::Directory(first.clone()));
    }
    if !first.exists() {
        return Err(StartupError::NotFound(first.clone()));
    }

    let is_lua = first
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("lua"));
    if is_lua {
        Ok(StartupTarget::Script(first.clone()))
    } else if config.is_archive(first) {
        Ok(StartupTarget::Archive(first.clone()))
    } else {
        Err(StartupError::UnsupportedFile(first.clone()))
    }
}

/// Mount `target` and return the entry script path inside the VFS.
pub fn prepare(
    target: &StartupTarget,
    vfs: &Vfs,
    config: &EngineConfig,
) -> Result<String, StartupError> {
    let mount_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StartupError::Mount { path, source }
    };

    let (entry, label) = match target {
        StartupTarget::Script(script) => {
            let dir = script
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let Some(name) = script.file_name().and_then(|n| n.to_str()) else {
                return Err(StartupError::UnsupportedFile(script.clone()));
            };
            vfs.mount_dir(dir).map_err(mount_err(dir))?;
            (name.to_string(), dir.display().to_string())
        },
        StartupTarget::Directory(dir) => {
            vfs.mount_dir(dir).map_err(mount_err(dir))?;
            (config.entry_script.clone(), dir.display().to_string())
        },
        StartupTarget::Archive(path) => {
            vfs.mount_archive_file(path).map_err(mount_err(path))?;
            (config.entry_script.clone(), path.display().to_string())
        },
        StartupTarget::Bundled => {
            if !vfs.is_file(&config.entry_script) {
                return Err(StartupError::NoGame {
                    examples: find_examples(Path::new(&config.examples_dir), &config.entry_script),
                });
            }
            info!("Starting {} from bundled content", config.entry_script);
            return Ok(config.entry_script.clone());
        },
    };

    // The entry must come from the target itself, not from content beneath it.
    if !vfs.top_is_file(&entry) {
        vfs.unmount(&label);
        return Err(StartupError::MissingEntry {
            entry,
            target: label,
        });
    }

    info!("Starting {entry} from {label}");
    Ok(entry)
}

/// Example games under `dir`: subdirectories that contain `entry_script`.
#[must_use]
pub fn find_examples(dir: &Path, entry_script: &str) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut examples: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().join(entry_script).is_file())
        .filter_map(|e| match e.file_name().into_string() {
            Ok(name) => Some(format!("{}/{name}", dir.display())),
            Err(raw) => {
                warn!("Skipping example with non UTF-8 name: {raw:?}");
                None
            },
        })
        .collect();
    examples.sort();
    examples
}
