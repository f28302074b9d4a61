//! # lime2d Script
//!
//! Hosts the Lua runtime that runs game code.
//!
//! Scripts are loaded through the engine's virtual filesystem, so `require`
//! works the same whether a game ships as loose files, a standalone archive,
//! or an archive fused onto the executable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod host;

pub use error::{ScriptError, ScriptResult};
pub use host::LuaHost;
