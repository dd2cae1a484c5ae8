//! Cover art resolver - walks the fallback chain for one track.
//!
//! The standard chain, cheapest source first:
//! 1. Disk cache
//! 2. Picture embedded in the audio file's tags
//! 3. Image file in the audio file's folder
//! 4. Remote lookup service (only when configured)
//! 5. Placeholder image (cannot fail)
//!
//! # Design
//!
//! A resolution is a small state machine: `Pending(i)` runs `chain[i]`, a hit
//! moves to `Served`, a miss moves to `Pending(i + 1)` or, after the last
//! stage, to `Empty`. Stages never overlap. Resolutions of the same key are
//! serialized so that a second request waits for the first and is then
//! answered from the cache instead of repeating a download.

use std::collections::HashMap;
use std::sync::Arc;

use super::cache::CoverCache;
use super::embedded::EmbeddedArtFetcher;
use super::fetcher::{CacheFetcher, FetchOutcome, Fetcher, FetcherKind};
use super::key::CacheKey;
use super::placeholder::PlaceholderFetcher;
use super::remote::{DEFAULT_IMAGE_INDEX, RemoteLookupFetcher};
use super::sidecar::FolderArtFetcher;
use crate::error::Result;
use crate::lookup::LookupApi;
use crate::model::Track;

/// Ordered list of fetchers tried for one resolution.
#[derive(Default)]
pub struct FetchChain {
    fetchers: Vec<Box<dyn Fetcher>>,
}

impl FetchChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn then(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetchers.push(Box::new(fetcher));
        self
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Kinds of the stages, in order.
    pub fn kinds(&self) -> Vec<FetcherKind> {
        self.fetchers.iter().map(|f| f.kind()).collect()
    }
}

/// Position of a resolution in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending(usize),
    Served(FetcherKind),
    Empty,
}

/// How a resolution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The entry is cached; `FetcherKind` names the stage that succeeded
    Served(FetcherKind),
    /// Every stage missed (only possible without a placeholder stage)
    Empty,
}

/// Result of resolving one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub key: CacheKey,
    pub outcome: ResolveOutcome,
}

impl Resolution {
    /// Key to serve, if the chain produced an entry.
    pub fn served_key(&self) -> Option<&CacheKey> {
        match self.outcome {
            ResolveOutcome::Served(_) => Some(&self.key),
            ResolveOutcome::Empty => None,
        }
    }
}

/// Run `chain` for `track` until a stage reports a hit.
pub async fn walk(
    chain: &FetchChain,
    track: &Track,
    key: &CacheKey,
    cache: &CoverCache,
) -> Result<ResolveOutcome> {
    let last = chain.len();
    let mut stage = if chain.is_empty() {
        Stage::Empty
    } else {
        Stage::Pending(0)
    };

    loop {
        stage = match stage {
            Stage::Pending(i) => {
                let fetcher = &chain.fetchers[i];
                let outcome = fetcher.attempt(track, key, cache).await?;
                tracing::debug!(stage = %fetcher.kind(), ?outcome, key = %key, "fetch stage finished");
                match outcome {
                    FetchOutcome::Found => Stage::Served(fetcher.kind()),
                    FetchOutcome::NotFound if i + 1 < last => Stage::Pending(i + 1),
                    FetchOutcome::NotFound => Stage::Empty,
                }
            }
            Stage::Served(kind) => return Ok(ResolveOutcome::Served(kind)),
            Stage::Empty => return Ok(ResolveOutcome::Empty),
        };
    }
}

/// Per-key locks for resolutions in progress.
#[derive(Default)]
struct InFlight {
    locks: parking_lot::Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held while a key is being resolved.
struct KeyGuard {
    key: CacheKey,
    in_flight: Arc<InFlight>,
    _lock: tokio::sync::OwnedMutexGuard<()>,
}

impl InFlight {
    async fn acquire(self: &Arc<Self>, key: &CacheKey) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries only the map references were left by cancelled waiters
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        KeyGuard {
            key: key.clone(),
            in_flight: Arc::clone(self),
            _lock: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut locks = self.in_flight.locks.lock();
        // Only the map and this guard still reference the lock: nobody waits
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.key);
        }
    }
}

#[derive(Clone)]
struct RemoteSource {
    api: Arc<dyn LookupApi>,
    http_client: reqwest::Client,
    image_index: usize,
}

/// Cover art resolver with caching and request de-duplication.
#[derive(Clone)]
pub struct CoverResolver {
    cache: CoverCache,
    remote: Option<RemoteSource>,
    in_flight: Arc<InFlight>,
}

impl CoverResolver {
    /// Resolver using only local sources and the placeholder.
    pub fn new(cache: CoverCache) -> Self {
        Self {
            cache,
            remote: None,
            in_flight: Arc::default(),
        }
    }

    /// Enable the remote lookup stage.
    pub fn with_lookup(mut self, api: Arc<dyn LookupApi>) -> Self {
        self.remote = Some(RemoteSource {
            api,
            http_client: reqwest::Client::new(),
            image_index: DEFAULT_IMAGE_INDEX,
        });
        self
    }

    /// Change which entry of the lookup's image list is downloaded.
    pub fn with_image_index(mut self, index: usize) -> Self {
        if let Some(remote) = self.remote.as_mut() {
            remote.image_index = index;
        }
        self
    }

    pub fn cache(&self) -> &CoverCache {
        &self.cache
    }

    /// Build the standard chain for one request.
    pub fn chain(&self) -> FetchChain {
        let chain = FetchChain::new()
            .then(CacheFetcher)
            .then(EmbeddedArtFetcher)
            .then(FolderArtFetcher);

        let chain = match &self.remote {
            Some(remote) => chain.then(
                RemoteLookupFetcher::new(remote.api.clone(), remote.http_client.clone())
                    .with_image_index(remote.image_index),
            ),
            None => chain,
        };

        chain.then(PlaceholderFetcher)
    }

    /// Resolve the cover for `track` with the standard chain.
    pub async fn resolve(&self, track: &Track) -> Result<Resolution> {
        self.resolve_with(track, self.chain()).await
    }

    /// Resolve the cover for `track` with a caller-supplied chain.
    pub async fn resolve_with(&self, track: &Track, chain: FetchChain) -> Result<Resolution> {
        let key = CacheKey::derive(&track.artist, &track.album);
        let _guard = self.in_flight.acquire(&key).await;
        tracing::debug!(key = %key, stages = ?chain.kinds(), "resolving cover");

        let outcome = walk(&chain, track, &key, &self.cache).await?;
        match outcome {
            ResolveOutcome::Served(kind) => {
                tracing::info!(source = %kind, "Resolved cover for {} / {}", track.artist, track.album);
            }
            ResolveOutcome::Empty => {
                tracing::warn!("No cover for {} / {}: chain exhausted", track.artist, track.album);
            }
        }

        Ok(Resolution { key, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::PLACEHOLDER_IMAGE;
    use crate::error::Error;
    use crate::lookup::LookupError;
    use crate::lookup::traits::mocks::MockLookup;
    use crate::test_utils::{Scripted, mp3_with_cover, mp3_without_art, spawn_image_server};
    use async_trait::async_trait;
    use sha1::{Digest, Sha1};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Album folder with one audio file and a cache directory beside it.
    struct Fixture {
        _temp: TempDir,
        album_dir: PathBuf,
        resolver: CoverResolver,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let album_dir = temp.path().join("music");
        std::fs::create_dir(&album_dir).unwrap();
        let cache = CoverCache::open(temp.path().join("albumart")).await.unwrap();
        Fixture {
            _temp: temp,
            album_dir,
            resolver: CoverResolver::new(cache),
        }
    }

    fn brad_sucks(path: PathBuf) -> Track {
        Track::new("Brad Sucks", "Out Of It", path)
    }

    #[tokio::test]
    async fn test_standard_chain_order() {
        let fx = fixture().await;
        assert_eq!(
            fx.resolver.chain().kinds(),
            vec![
                FetcherKind::Cache,
                FetcherKind::Embedded,
                FetcherKind::Folder,
                FetcherKind::Placeholder
            ]
        );

        let with_remote = fx
            .resolver
            .clone()
            .with_lookup(Arc::new(MockLookup::with_empty_url()));
        assert_eq!(
            with_remote.chain().kinds(),
            vec![
                FetcherKind::Cache,
                FetcherKind::Embedded,
                FetcherKind::Folder,
                FetcherKind::Remote,
                FetcherKind::Placeholder
            ]
        );
    }

    #[tokio::test]
    async fn test_cached_entry_short_circuits() {
        let fx = fixture().await;
        let track = brad_sucks(fx.album_dir.join("07.mp3"));
        let key = CacheKey::derive(&track.artist, &track.album);
        fx.resolver.cache().write(&key, b"already cached").await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let chain = FetchChain::new()
            .then(CacheFetcher)
            .then(Scripted::found(FetcherKind::Embedded, calls.clone()))
            .then(Scripted::found(FetcherKind::Folder, calls.clone()))
            .then(Scripted::found(FetcherKind::Remote, calls.clone()))
            .then(Scripted::found(FetcherKind::Placeholder, calls.clone()));

        let resolution = fx.resolver.resolve_with(&track, chain).await.unwrap();

        assert_eq!(resolution.outcome, ResolveOutcome::Served(FetcherKind::Cache));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.resolver.cache().read(&key).await.unwrap(), b"already cached");
    }

    #[tokio::test]
    async fn test_second_resolution_is_identical_and_cached() {
        let fx = fixture().await;
        let audio = fx.album_dir.join("Brad_Sucks_-_07_-_Total_Breakdown.mp3");
        std::fs::write(&audio, mp3_with_cover(b"embedded cover")).unwrap();
        let track = brad_sucks(audio);

        let first = fx.resolver.resolve(&track).await.unwrap();
        let first_bytes = fx.resolver.cache().read(&first.key).await.unwrap();
        let second = fx.resolver.resolve(&track).await.unwrap();
        let second_bytes = fx.resolver.cache().read(&second.key).await.unwrap();

        assert_eq!(first.outcome, ResolveOutcome::Served(FetcherKind::Embedded));
        assert_eq!(second.outcome, ResolveOutcome::Served(FetcherKind::Cache));
        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn test_misses_advance_to_next_stage() {
        let fx = fixture().await;
        let track = brad_sucks(fx.album_dir.join("07.mp3"));
        let misses = Arc::new(AtomicUsize::new(0));
        let chain = FetchChain::new()
            .then(Scripted::not_found(FetcherKind::Embedded, misses.clone()))
            .then(Scripted::not_found(FetcherKind::Folder, misses.clone()))
            .then(Scripted::not_found(FetcherKind::Remote, misses.clone()))
            .then(PlaceholderFetcher);

        let resolution = fx.resolver.resolve_with(&track, chain).await.unwrap();

        assert_eq!(misses.load(Ordering::SeqCst), 3);
        assert_eq!(
            resolution.outcome,
            ResolveOutcome::Served(FetcherKind::Placeholder)
        );
        assert_eq!(resolution.served_key(), Some(&resolution.key));
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_empty() {
        let fx = fixture().await;
        let track = brad_sucks(fx.album_dir.join("07.mp3"));
        let misses = Arc::new(AtomicUsize::new(0));
        let chain = FetchChain::new()
            .then(CacheFetcher)
            .then(Scripted::not_found(FetcherKind::Remote, misses.clone()));

        let resolution = fx.resolver.resolve_with(&track, chain).await.unwrap();

        assert_eq!(resolution.outcome, ResolveOutcome::Empty);
        assert_eq!(resolution.served_key(), None);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_is_empty() {
        let fx = fixture().await;
        let track = brad_sucks(fx.album_dir.join("07.mp3"));

        let resolution = fx
            .resolver
            .resolve_with(&track, FetchChain::new())
            .await
            .unwrap();

        assert_eq!(resolution.outcome, ResolveOutcome::Empty);
    }

    struct Broken;

    #[async_trait]
    impl Fetcher for Broken {
        fn kind(&self) -> FetcherKind {
            FetcherKind::Folder
        }

        async fn attempt(&self, _: &Track, _: &CacheKey, _: &CoverCache) -> Result<FetchOutcome> {
            Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )))
        }
    }

    #[tokio::test]
    async fn test_fatal_error_stops_the_chain() {
        let fx = fixture().await;
        let track = brad_sucks(fx.album_dir.join("07.mp3"));
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = FetchChain::new()
            .then(Broken)
            .then(Scripted::found(FetcherKind::Placeholder, calls.clone()));

        let result = fx.resolver.resolve_with(&track, chain).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedded_cover_fidelity() {
        let fx = fixture().await;
        let cover = b"\xFF\xD8\xFF\xE0 front cover of Out Of It \xFF\xD9".to_vec();
        let audio = fx.album_dir.join("Brad_Sucks_-_07_-_Total_Breakdown.mp3");
        std::fs::write(&audio, mp3_with_cover(&cover)).unwrap();

        let resolution = fx.resolver.resolve(&brad_sucks(audio)).await.unwrap();

        assert_eq!(resolution.outcome, ResolveOutcome::Served(FetcherKind::Embedded));
        let cached = fx.resolver.cache().read(&resolution.key).await.unwrap();
        assert_eq!(Sha1::digest(&cached), Sha1::digest(&cover));
    }

    #[tokio::test]
    async fn test_folder_fallback() {
        let fx = fixture().await;
        let audio = fx.album_dir.join("Brad_Sucks_-_07_-_Total_Breakdown_no_art.mp3");
        std::fs::write(&audio, mp3_without_art()).unwrap();
        let sidecar = fx.album_dir.join("Brad_Sucks_-_Out_Of_It.jpg");
        std::fs::write(&sidecar, b"\xFF\xD8folder cover\xFF\xD9").unwrap();

        let resolution = fx.resolver.resolve(&brad_sucks(audio)).await.unwrap();

        assert_eq!(resolution.outcome, ResolveOutcome::Served(FetcherKind::Folder));
        assert_eq!(
            fx.resolver.cache().read(&resolution.key).await.unwrap(),
            std::fs::read(&sidecar).unwrap()
        );
    }

    #[tokio::test]
    async fn test_remote_after_local_sources() {
        let fx = fixture().await;
        let audio = fx.album_dir.join("no_art.mp3");
        std::fs::write(&audio, mp3_without_art()).unwrap();
        let base = spawn_image_server(b"downloaded cover".to_vec()).await;
        let resolver = fx.resolver.clone().with_lookup(Arc::new(MockLookup::with_image_url(
            &format!("{}/cover.jpg", base),
        )));

        let resolution = resolver.resolve(&brad_sucks(audio)).await.unwrap();

        assert_eq!(resolution.outcome, ResolveOutcome::Served(FetcherKind::Remote));
        assert_eq!(
            resolver.cache().read(&resolution.key).await.unwrap(),
            b"downloaded cover"
        );
    }

    #[tokio::test]
    async fn test_placeholder_when_everything_misses() {
        let fx = fixture().await;
        let audio = fx.album_dir.join("no_art.mp3");
        std::fs::write(&audio, mp3_without_art()).unwrap();
        let lookup = Arc::new(MockLookup::with_error(LookupError::Network(
            "connection refused".to_string(),
        )));
        let resolver = fx.resolver.clone().with_lookup(lookup.clone());

        let resolution = resolver.resolve(&brad_sucks(audio)).await.unwrap();

        assert_eq!(lookup.calls(), 1);
        assert_eq!(
            resolution.outcome,
            ResolveOutcome::Served(FetcherKind::Placeholder)
        );
        assert_eq!(
            resolver.cache().read(&resolution.key).await.unwrap(),
            PLACEHOLDER_IMAGE
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_fetch_once() {
        let fx = fixture().await;
        let track = brad_sucks(fx.album_dir.join("07.mp3"));
        let downloads = Arc::new(AtomicUsize::new(0));
        let chain = || {
            FetchChain::new()
                .then(CacheFetcher)
                .then(Scripted::found(FetcherKind::Remote, downloads.clone()))
                .then(PlaceholderFetcher)
        };

        let (a, b) = tokio::join!(
            fx.resolver.resolve_with(&track, chain()),
            fx.resolver.resolve_with(&track, chain()),
        );

        let mut sources = vec![a.unwrap().outcome, b.unwrap().outcome];
        sources.sort_by_key(|o| format!("{:?}", o));
        assert_eq!(downloads.load(Ordering::SeqCst), 1);
        assert_eq!(
            sources,
            vec![
                ResolveOutcome::Served(FetcherKind::Cache),
                ResolveOutcome::Served(FetcherKind::Remote)
            ]
        );
        // Locks are released once nobody waits on the key
        assert_eq!(fx.resolver.in_flight.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_pin_lock() {
        let in_flight = Arc::new(InFlight::default());
        let key = CacheKey::derive("Brad Sucks", "Out Of It");

        let holder = in_flight.acquire(&key).await;
        let mut waiter = Box::pin(in_flight.acquire(&key));
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        // The holder leaves while the waiter is queued, then the waiter gives up
        drop(holder);
        drop(waiter);
        assert_eq!(in_flight.pending(), 1);

        let other = in_flight.acquire(&CacheKey::derive("a", "b")).await;
        assert_eq!(in_flight.pending(), 1);
        drop(other);
        assert_eq!(in_flight.pending(), 0);
    }
}
