//! Engine configuration.
//!
//! Settings come from `lime.toml`. A game can ship one inside its archive or
//! next to the executable; otherwise the user's config directory is checked.
//! Missing or invalid files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use lime_archive::Vfs;
use lime_common::version::{CONFIG_FILE, DEFAULT_ARCHIVE_EXTENSIONS, DEFAULT_ENTRY_SCRIPT, ENGINE_NAME};

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Startup ===
    /// Script run when a game directory or archive is started
    pub entry_script: String,
    /// File extensions treated as game archives
    pub archive_extensions: Vec<String>,
    /// Directory (relative to the executable) scanned for bundled examples
    pub examples_dir: String,

    // === Frame Loop ===
    /// Target frames per second (0 = unthrottled)
    pub target_fps: u32,
    /// Stop after this many frames (0 = run until the game quits)
    pub max_frames: u64,

    // === Diagnostics ===
    /// Write crash reports when the engine panics
    pub crash_reports: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entry_script: DEFAULT_ENTRY_SCRIPT.to_string(),
            archive_extensions: DEFAULT_ARCHIVE_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            examples_dir: "examples".to_string(),

            target_fps: 60,
            max_frames: 0,

            crash_reports: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration, preferring a `lime.toml` served by the game content.
    pub fn load(vfs: &Vfs) -> Self {
        if vfs.is_file(CONFIG_FILE) {
            match vfs.read_to_string(CONFIG_FILE) {
                Ok(contents) => return Self::parse_or_default(&contents, CONFIG_FILE),
                Err(e) => warn!("Failed to read {CONFIG_FILE}: {e}"),
            }
        }

        match Self::user_config_path() {
            Some(path) => Self::load_from(path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => Self::parse_or_default(&contents, &path.display().to_string()),
            Err(e) => {
                warn!("Failed to read config file: {e}");
                Self::default()
            },
        }
    }

    fn parse_or_default(contents: &str, origin: &str) -> Self {
        match toml::from_str::<Self>(contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {origin}");
                config
            },
            Err(e) => {
                warn!("Failed to parse config file {origin}: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Per-user configuration file location.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(ENGINE_NAME).join(CONFIG_FILE))
    }

    /// Validate and normalize configuration values.
    pub fn validate(&mut self) {
        self.target_fps = self.target_fps.min(1000);

        if self.entry_script.trim().is_empty() {
            self.entry_script = DEFAULT_ENTRY_SCRIPT.to_string();
        }

        let mut seen = HashSet::new();
        self.archive_extensions = self
            .archive_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && seen.insert(ext.clone()))
            .collect();
        if self.archive_extensions.is_empty() {
            self.archive_extensions = Self::default().archive_extensions;
        }
    }

    /// Returns true if `path` has one of the configured archive extensions.
    #[must_use]
    pub fn is_archive(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.archive_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.entry_script, "main.lua");
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.max_frames, 0);
        assert!(config.crash_reports);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.target_fps = 5000;
        config.entry_script = "   ".to_string();
        config.archive_extensions = vec![
            ".ZIP".to_string(),
            String::new(),
            "pak".to_string(),
            "zip".to_string(),
        ];

        config.validate();

        assert_eq!(config.target_fps, 1000);
        assert_eq!(config.entry_script, "main.lua");
        assert_eq!(config.archive_extensions, vec!["zip", "pak"]);
    }

    #[test]
    fn test_empty_extension_list_restored() {
        let mut config = EngineConfig::default();
        config.archive_extensions = vec![" ".to_string()];
        config.validate();
        assert_eq!(config.archive_extensions, vec!["zip", "lime"]);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("lime.toml");

        let mut config = EngineConfig::default();
        config.target_fps = 144;
        config.max_frames = 10;
        config.crash_reports = false;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = EngineConfig::load_from("/nonexistent/path/lime.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("lime.toml");
        fs::write(&path, "target_fps = \"fast\"").expect("write");
        assert_eq!(EngineConfig::load_from(&path), EngineConfig::default());
    }

    #[test]
    fn test_config_from_game_content() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("lime.toml"),
            "entry_script = \"boot.lua\"\nmax_frames = 3\n",
        )
        .expect("write");
        let vfs = Vfs::new();
        vfs.mount_dir(temp_dir.path()).expect("mount");

        let config = EngineConfig::load(&vfs);
        assert_eq!(config.entry_script, "boot.lua");
        assert_eq!(config.max_frames, 3);
        assert_eq!(config.target_fps, 60);
    }

    #[test]
    fn test_is_archive() {
        let config = EngineConfig::default();
        assert!(config.is_archive(Path::new("game.zip")));
        assert!(config.is_archive(Path::new("dir/Game.LIME")));
        assert!(!config.is_archive(Path::new("main.lua")));
        assert!(!config.is_archive(Path::new("noext")));
    }

    #[test]
    fn test_config_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("Failed to serialize");

        assert!(toml_str.contains("entry_script"));
        assert!(toml_str.contains("target_fps"));
    }
}
