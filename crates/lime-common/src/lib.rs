//! # lime2d Common
//!
//! Common types and utilities shared by the lime2d crates.
//!
//! This crate provides:
//! - Archive and virtual filesystem error types
//! - Virtual path normalization rules
//! - Engine version and naming constants
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod version;
pub mod vpath;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::version::*;
}

pub use prelude::*;
