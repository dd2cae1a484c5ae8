//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function that takes the loaded
//! configuration plus its own arguments and returns an `anyhow::Result<()>`.

use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};

use crate::config::{self, Config};
use crate::cover::{CacheKey, CoverCache, CoverResolver, ResolveOutcome};
use crate::error::Error;
use crate::library::{self, NowPlaying};
use crate::lookup::LastFmClient;
use crate::model::Track;
use crate::server::{self, AppState};

/// Album cover resolver and server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Remote lookup overrides shared by commands that resolve covers
#[derive(Args)]
pub struct RemoteArgs {
    /// Last.fm API key (or set LASTFM_API_KEY env var)
    #[arg(long, env = "LASTFM_API_KEY")]
    pub api_key: Option<String>,

    /// Skip the remote lookup stage
    #[arg(long)]
    pub offline: bool,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve cover art over HTTP
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Audio file to report as the current track
        #[arg(long)]
        track: Option<PathBuf>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Resolve the cover for one album and print where it came from
    Resolve {
        /// Artist name
        #[arg(long)]
        artist: String,
        /// Album title
        #[arg(long)]
        album: String,
        /// Audio file of a track from the album
        #[arg(long)]
        path: Option<PathBuf>,
        /// Copy the resolved cover to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Print the cache key for an album
    Key {
        /// Artist name
        #[arg(long)]
        artist: String,
        /// Album title
        #[arg(long)]
        album: String,
    },
    /// Show cache location and usage
    Stats,
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Run the parsed command line.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    match &cli.command {
        Commands::Serve {
            bind,
            port,
            track,
            remote,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            apply_remote_args(&mut config, remote);
            cmd_serve(&runtime()?, &config, track.as_deref())
        }
        Commands::Resolve {
            artist,
            album,
            path,
            output,
            remote,
        } => {
            apply_remote_args(&mut config, remote);
            let track = Track::new(artist.as_str(), album.as_str(), path.clone().unwrap_or_default());
            cmd_resolve(&runtime()?, &config, &track, output.as_deref())
        }
        Commands::Key { artist, album } => {
            println!("{}", CacheKey::derive(artist, album));
            Ok(())
        }
        Commands::Stats => cmd_stats(&runtime()?, &config),
        Commands::Config { save } => cmd_config(cli.config.as_deref(), &config, *save),
    }
}

/// The server handles few, short requests; one thread is plenty.
fn runtime() -> anyhow::Result<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

fn apply_remote_args(config: &mut Config, remote: &RemoteArgs) {
    if let Some(key) = &remote.api_key {
        config.remote.api_key = Some(key.clone());
    }
    if remote.offline {
        config.remote.enabled = false;
    }
}

/// Build the resolver described by `config`.
async fn build_resolver(config: &Config) -> anyhow::Result<CoverResolver> {
    let cache = CoverCache::open(config.albumart.cache_dir()).await?;
    info!("Cover cache at {:?}", cache.dir());

    let resolver = CoverResolver::new(cache);
    let resolver = match config.remote.active_key() {
        Some(key) => resolver
            .with_lookup(Arc::new(LastFmClient::with_base_url(
                key,
                config.remote.base_url.as_str(),
            )))
            .with_image_index(config.remote.image_index),
        None => {
            info!("Remote lookup disabled");
            resolver
        }
    };
    Ok(resolver)
}

fn listen_addr(config: &Config) -> Result<SocketAddr, Error> {
    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| Error::config(format!("invalid bind address {:?}: {}", config.server.bind, e)))?;
    Ok(SocketAddr::new(ip, config.server.port))
}

// ============================================================================
// Individual command implementations
// ============================================================================

fn cmd_serve(rt: &Runtime, config: &Config, track: Option<&Path>) -> anyhow::Result<()> {
    let addr = listen_addr(config)?;

    rt.block_on(async {
        let now_playing = NowPlaying::new();
        if let Some(path) = track {
            match library::read_track(path) {
                Ok(track) => now_playing.set(Some(track)),
                Err(e) => warn!("Could not read {:?}, starting without a track: {}", path, e),
            }
        }

        let state = AppState {
            resolver: build_resolver(config).await?,
            tracks: Arc::new(now_playing),
            enabled: config.albumart.enabled,
        };
        if !state.enabled {
            info!("Album art disabled; only /albumartrender is served");
        }

        server::run(state, addr).await?;
        Ok(())
    })
}

fn cmd_resolve(
    rt: &Runtime,
    config: &Config,
    track: &Track,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let resolver = build_resolver(config).await?;
        let resolution = resolver.resolve(track).await?;

        println!("Key:    {}", resolution.key);
        let ResolveOutcome::Served(kind) = resolution.outcome else {
            println!("No cover found");
            return Ok(());
        };
        println!("Source: {}", kind);
        println!("File:   {:?}", resolver.cache().path(&resolution.key));

        if let Some(output) = output {
            let bytes = resolver.cache().read(&resolution.key).await?;
            tokio::fs::write(output, &bytes).await?;
            println!("Copied {} bytes to {:?}", bytes.len(), output);
        }
        Ok(())
    })
}

fn cmd_stats(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let cache = CoverCache::open(config.albumart.cache_dir()).await?;
        let entries = cache.len().await?;
        let bytes = cache.size_bytes().await?;

        println!("Cache directory: {:?}", cache.dir());
        println!("Entries:         {}", entries);
        println!("Size:            {:.1} KiB", bytes as f64 / 1024.0);
        Ok(())
    })
}

fn cmd_config(path: Option<&Path>, config: &Config, save: bool) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);

    if save {
        let saved = match path {
            Some(path) => {
                config::save_to(config, path)?;
                path.to_path_buf()
            }
            None => config::save(config)?,
        };
        println!("\nSaved to {:?}", saved);
    }
    Ok(())
}
