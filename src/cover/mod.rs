//! Cover art resolution and caching.
//!
//! Resolves a track's album cover through an ordered chain of sources and
//! keeps every result on disk, keyed by artist and album:
//!
//! 1. **Cache** - a previous resolution for the same artist/album
//! 2. **Embedded tags** - picture stored in the audio file
//! 3. **Folder** - image file next to the audio file
//! 4. **Remote lookup** - album image advertised by the lookup service
//! 5. **Placeholder** - fixed image compiled into the binary
//!
//! # Design Principles
//!
//! - **Non-blocking**: filesystem and network work is async; tag parsing runs
//!   on the blocking pool
//! - **Strictly sequential**: a stage only runs after the previous one missed
//! - **Always terminates**: the placeholder stage cannot miss, so a
//!   resolution always ends with a cached file
//! - **Atomic cache writes**: readers never see a partially written entry

mod cache;
mod embedded;
mod fetcher;
mod key;
mod placeholder;
mod remote;
mod resolver;
mod sidecar;

pub use cache::CoverCache;
pub use embedded::{EmbeddedArtFetcher, embedded_pictures};
pub use fetcher::{CacheFetcher, FetchOutcome, Fetcher, FetcherKind};
pub use key::CacheKey;
pub use placeholder::{PLACEHOLDER_IMAGE, PlaceholderFetcher};
pub use remote::{DEFAULT_IMAGE_INDEX, RemoteLookupFetcher};
pub use resolver::{CoverResolver, FetchChain, Resolution, ResolveOutcome, Stage, walk};
pub use sidecar::{FolderArtFetcher, find_folder_image};
