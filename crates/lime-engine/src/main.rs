//! # lime2d
//!
//! Engine entry point. Run it directly to play a fused game or the game
//! beside it, or drop a script, folder or archive onto it.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use anyhow::Result;
use lime_common::version::ENGINE_VERSION;
use lime_engine::bootstrap::{self, LaunchArgs};
use lime_engine::crash_report::CrashReporter;
use lime_engine::screen::TerminalFrontend;
use tracing::info;

/// Main entry point.
fn main() -> Result<()> {
    lime_engine::init_tracing()?;

    info!("lime2d starting...");
    info!("Version: {}", ENGINE_VERSION);

    let args = LaunchArgs::from_args(std::env::args_os());
    let crash_dir = CrashReporter::default_dir();
    bootstrap::run_with_exe_and_args(args, TerminalFrontend::new(), crash_dir.as_deref())?;

    info!("lime2d shutdown complete");
    Ok(())
}
