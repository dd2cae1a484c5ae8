//! Command-line interface for albumart.
//!
//! Commands for serving covers over HTTP, resolving a single album, and
//! inspecting the cache and configuration.

mod commands;

pub use commands::{Cli, Commands, run_command};
