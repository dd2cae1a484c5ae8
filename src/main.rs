//! albumart - album cover resolution and serving.
//!
//! Resolves a cover image for the current track through a chain of sources
//! (cache, embedded tag, album folder, remote lookup, placeholder), caches the
//! result on disk and serves it over HTTP. Also usable from the command line
//! to resolve a single album or inspect the cache.

pub mod cli;
pub mod config;
pub mod cover;
pub mod error;
pub mod library;
pub mod lookup;
pub mod model;
pub mod server;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("albumart=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args)
}
