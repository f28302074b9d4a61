//! # lime2d Engine
//!
//! Bootstrap and runtime for lime2d games.
//!
//! The `lime2d` binary locates itself, mounts the game content beside it or
//! fused onto it, and runs the game's Lua scripts through [`app::App`].
//! The `lime-fuse` binary builds such a fused executable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod crash_report;
pub mod screen;
pub mod startup;
pub mod timing;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber used by the engine binaries.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("lime=info".parse()?))
        .try_init()?;
    Ok(())
}
