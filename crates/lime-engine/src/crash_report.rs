//! Crash Reporting System
//!
//! Captures panics with backtraces and writes them as JSON files under the
//! user's local data directory.

use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use lime_common::version::ENGINE_NAME;

use crate::bootstrap::panic_message;

/// Global flag to prevent recursive panics
static HANDLING_PANIC: AtomicBool = AtomicBool::new(false);

/// Errors that can occur during crash reporting
#[derive(Debug, Error)]
pub enum ReportError {
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A crash report containing all relevant debugging information
#[derive(Debug, Clone, Serialize)]
pub struct CrashReport {
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Engine version
    pub engine_version: String,
    /// Operating system
    pub os: String,
    /// Architecture
    pub arch: String,
    /// The panic message
    pub panic_message: String,
    /// Location where panic occurred
    pub panic_location: Option<String>,
    /// Stack backtrace
    pub backtrace: String,
    /// Files the engine was started with
    pub startup_files: Vec<String>,
    /// Build information
    pub build_info: BuildInfo,
}

/// Build-time information
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    /// Minimum supported Rust version of the crate
    pub min_rust_version: String,
    /// Build target architecture
    pub target: String,
    /// Debug or release build
    pub profile: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            min_rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            target: std::env::consts::ARCH.to_string(),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            }
            .to_string(),
        }
    }
}

/// Crash reporter that captures and persists crash information
#[derive(Debug)]
pub struct CrashReporter {
    report_dir: PathBuf,
    engine_version: String,
    startup_files: Vec<String>,
}

impl CrashReporter {
    /// Create a new crash reporter
    ///
    /// # Arguments
    /// * `report_dir` - Directory to store crash reports
    /// * `engine_version` - Engine version string
    pub fn new(report_dir: impl AsRef<Path>, engine_version: &str) -> Self {
        let report_dir = report_dir.as_ref().to_path_buf();

        if let Err(e) = fs::create_dir_all(&report_dir) {
            warn!("Failed to create crash report directory: {}", e);
        }

        Self {
            report_dir,
            engine_version: engine_version.to_string(),
            startup_files: Vec::new(),
        }
    }

    /// Default report directory, `<local data dir>/lime2d/crashes`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(ENGINE_NAME).join("crashes"))
    }

    /// Record the startup files for inclusion in reports.
    pub fn set_startup_files(&mut self, files: &[PathBuf]) {
        self.startup_files = files.iter().map(|f| f.display().to_string()).collect();
    }

    /// Directory reports are written to.
    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Install the panic hook
    ///
    /// The hook only records the crash. Unwinding continues afterwards, so a
    /// surrounding `catch_unwind` still gets to show its error screen.
    pub fn install_panic_hook(self) -> Arc<Self> {
        let reporter = Arc::new(self);
        let reporter_clone = Arc::clone(&reporter);

        panic::set_hook(Box::new(move |panic_info| {
            // Prevent recursive panics
            if HANDLING_PANIC.swap(true, Ordering::SeqCst) {
                eprintln!("Recursive panic detected, aborting");
                std::process::abort();
            }

            match reporter_clone.handle_panic(panic_info) {
                Ok(path) => {
                    eprintln!("\n╔══════════════════════════════════════════╗");
                    eprintln!("║           CRASH REPORT SAVED             ║");
                    eprintln!("╠══════════════════════════════════════════╣");
                    eprintln!("║ {}", path.display());
                    eprintln!("╚══════════════════════════════════════════╝\n");
                },
                Err(e) => {
                    eprintln!("Failed to save crash report: {e}");
                },
            }

            eprintln!("\n{panic_info}");

            HANDLING_PANIC.store(false, Ordering::SeqCst);
        }));

        reporter
    }

    fn handle_panic(&self, panic_info: &PanicHookInfo<'_>) -> Result<PathBuf, ReportError> {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
        let report = self.capture(panic_message(panic_info.payload()), location);
        self.write_report(&report)
    }

    /// Build a report for a panic with the given message and location.
    pub fn capture(&self, panic_message: String, panic_location: Option<String>) -> CrashReport {
        CrashReport {
            timestamp: Utc::now().to_rfc3339(),
            engine_version: self.engine_version.clone(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            panic_message,
            panic_location,
            backtrace: std::backtrace::Backtrace::force_capture().to_string(),
            startup_files: self.startup_files.clone(),
            build_info: BuildInfo::default(),
        }
    }

    /// Write a crash report to disk
    pub fn write_report(&self, report: &CrashReport) -> Result<PathBuf, ReportError> {
        let filename = format!("crash-{}.json", Utc::now().format("%Y%m%d-%H%M%S%.3f"));
        let path = self.report_dir.join(filename);

        let json = serde_json::to_string_pretty(report)?;

        let mut file = fs::File::create(&path)?;
        file.write_all(json.as_bytes())?;

        info!("Crash report written to: {}", path.display());
        Ok(path)
    }
}
