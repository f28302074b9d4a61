//! Engine naming and version constants.

/// Engine name, used for config and data directories.
pub const ENGINE_NAME: &str = "lime2d";

/// Engine version string.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Script executed when a game is started without an explicit entry file.
pub const DEFAULT_ENTRY_SCRIPT: &str = "main.lua";

/// Engine configuration file name.
pub const CONFIG_FILE: &str = "lime.toml";

/// File extensions recognized as game archives by default.
pub const DEFAULT_ARCHIVE_EXTENSIONS: [&str; 2] = ["zip", "lime"];
