//! Error screen and presentation frontend.
//!
//! When a game cannot start, or fails after it started, the engine switches
//! to an error screen instead of exiting silently. The [`Frontend`] decides
//! how that screen reaches the user.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use lime_common::version::ENGINE_NAME;
use tracing::{error, info};

/// Widest line drawn inside the terminal box.
const BOX_WIDTH: usize = 72;

/// Content of the error screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorScreen {
    /// Heading, e.g. "Fatal Error"
    pub title: String,
    /// Message lines
    pub lines: Vec<String>,
    /// Extra notes shown below the message (hints, available games)
    pub details: Vec<String>,
}

impl ErrorScreen {
    /// Build a screen, splitting `message` into lines.
    pub fn new(title: impl Into<String>, message: &str) -> Self {
        Self {
            title: title.into(),
            lines: split_lines(message),
            details: Vec::new(),
        }
    }

    /// Screen shown for failures after the engine is running.
    #[must_use]
    pub fn fatal(message: &str) -> Self {
        Self::new("Fatal Error", message)
    }

    /// Attach detail lines.
    #[must_use]
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// The message as a single string.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }
}

fn split_lines(message: &str) -> Vec<String> {
    let lines: Vec<String> = message
        .replace('\t', "    ")
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect();
    if lines.is_empty() {
        vec!["Unknown error".to_string()]
    } else {
        lines
    }
}

/// Presentation surface for engine screens.
pub trait Frontend {
    /// Show an error screen to the user.
    fn present_error(&mut self, screen: &ErrorScreen);
}

/// Frontend that writes screens to stderr and the log.
///
/// Release builds on Windows have no console, so the rendered screen is also
/// saved to a file the user can open.
#[derive(Debug, Default)]
pub struct TerminalFrontend {
    error_file: Option<PathBuf>,
}

impl TerminalFrontend {
    /// Frontend that also saves screens to [`TerminalFrontend::default_error_file`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            error_file: Self::default_error_file(),
        }
    }

    /// Frontend that also saves screens to `path`.
    #[must_use]
    pub fn with_error_file(path: impl Into<PathBuf>) -> Self {
        Self {
            error_file: Some(path.into()),
        }
    }

    /// `<local data dir>/lime2d/last_error.txt`.
    #[must_use]
    pub fn default_error_file() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(ENGINE_NAME).join("last_error.txt"))
    }

    /// Where error screens are saved, if anywhere.
    #[must_use]
    pub fn error_file(&self) -> Option<&Path> {
        self.error_file.as_deref()
    }

    fn save(screen: &ErrorScreen, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        Self::render(screen, &mut file)
    }

    /// Render `screen` as a boxed report into `out`.
    pub fn render(screen: &ErrorScreen, out: &mut impl Write) -> io::Result<()> {
        let rule = "═".repeat(BOX_WIDTH + 2);
        writeln!(out)?;
        writeln!(out, "╔{rule}╗")?;
        writeln!(out, "║ {:<BOX_WIDTH$} ║", truncate(&screen.title))?;
        writeln!(out, "╠{rule}╣")?;
        for line in &screen.lines {
            writeln!(out, "║ {:<BOX_WIDTH$} ║", truncate(line))?;
        }
        if !screen.details.is_empty() {
            writeln!(out, "╟{}╢", "─".repeat(BOX_WIDTH + 2))?;
            for line in &screen.details {
                writeln!(out, "║ {:<BOX_WIDTH$} ║", truncate(line))?;
            }
        }
        writeln!(out, "╚{rule}╝")?;
        writeln!(out)
    }
}

fn truncate(line: &str) -> String {
    if line.chars().count() <= BOX_WIDTH {
        line.to_string()
    } else {
        let mut cut: String = line.chars().take(BOX_WIDTH - 1).collect();
        cut.push('…');
        cut
    }
}

impl Frontend for TerminalFrontend {
    fn present_error(&mut self, screen: &ErrorScreen) {
        error!("{}: {}", screen.title, screen.message());
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        if let Err(e) = Self::render(screen, &mut lock) {
            error!("Failed to draw error screen: {e}");
        }

        if let Some(path) = &self.error_file {
            match Self::save(screen, path) {
                Ok(()) => info!("Error screen saved to {}", path.display()),
                Err(e) => error!("Failed to save error screen to {}: {e}", path.display()),
            }
        }
    }
}
