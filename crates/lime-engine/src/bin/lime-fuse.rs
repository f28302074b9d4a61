//! `lime-fuse`: append a game directory to a copy of the engine executable.
//!
//! ```text
//! lime-fuse --game mygame/ --output dist/mygame.exe
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lime_archive::{fuse_directory, FusedArchive};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "lime-fuse", version, about = "Fuse a lime2d game onto the engine executable")]
struct Args {
    /// Engine executable to copy (defaults to lime2d next to this tool)
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Game directory containing main.lua
    #[arg(long)]
    game: PathBuf,

    /// Fused executable to write
    #[arg(long, short)]
    output: PathBuf,
}

fn default_engine() -> Result<PathBuf> {
    let tool = std::env::current_exe().context("Failed to locate lime-fuse")?;
    let dir = tool.parent().context("lime-fuse has no parent directory")?;
    Ok(dir.join(format!("lime2d{}", std::env::consts::EXE_SUFFIX)))
}

fn main() -> Result<()> {
    lime_engine::init_tracing()?;
    let args = Args::parse();

    let engine = match args.engine {
        Some(engine) => engine,
        None => default_engine()?,
    };

    let summary = fuse_directory(&engine, &args.game, &args.output).with_context(|| {
        format!(
            "Failed to fuse {} onto {}",
            args.game.display(),
            engine.display()
        )
    })?;

    let archive = FusedArchive::open(&args.output)
        .context("Failed to reopen fused output")?
        .context("Fused output has no archive")?;

    info!(
        "Wrote {} ({} files, {} content bytes, archive at offset {})",
        args.output.display(),
        summary.files,
        summary.content_bytes,
        archive.base_offset()
    );
    Ok(())
}
