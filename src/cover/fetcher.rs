//! The fetcher capability shared by every stage of the fallback chain.

use std::fmt;

use async_trait::async_trait;

use super::cache::CoverCache;
use super::key::CacheKey;
use crate::error::Result;
use crate::model::Track;

/// Outcome of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The cover is now in the cache under the track's key
    Found,
    /// This source had nothing; try the next one
    NotFound,
}

/// Which source a fetcher draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetcherKind {
    Cache,
    Embedded,
    Folder,
    Remote,
    Placeholder,
}

impl fmt::Display for FetcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cache => "cache",
            Self::Embedded => "embedded",
            Self::Folder => "folder",
            Self::Remote => "remote",
            Self::Placeholder => "placeholder",
        };
        f.write_str(name)
    }
}

/// One strategy for producing a cover.
///
/// An implementation returning [`FetchOutcome::Found`] must already have
/// written the image to `cache` under `key`. Expected absences and swallowed
/// source failures are `Ok(NotFound)`; `Err` is reserved for failures that
/// should abort the whole resolution.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn kind(&self) -> FetcherKind;

    async fn attempt(&self, track: &Track, key: &CacheKey, cache: &CoverCache)
    -> Result<FetchOutcome>;
}

/// Succeeds when the cache already holds the key.
pub struct CacheFetcher;

#[async_trait]
impl Fetcher for CacheFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Cache
    }

    async fn attempt(
        &self,
        _track: &Track,
        key: &CacheKey,
        cache: &CoverCache,
    ) -> Result<FetchOutcome> {
        let exists = cache.exists(key).await;
        tracing::debug!("cover file {:?} exists: {}", cache.path(key), exists);
        Ok(if exists {
            FetchOutcome::Found
        } else {
            FetchOutcome::NotFound
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cache_fetcher_miss_then_hit() {
        let temp = TempDir::new().unwrap();
        let cache = CoverCache::open(temp.path()).await.unwrap();
        let track = Track::new("Brad Sucks", "Out Of It", "/nowhere/track.mp3");
        let key = CacheKey::derive(&track.artist, &track.album);

        let outcome = CacheFetcher.attempt(&track, &key, &cache).await.unwrap();
        assert_eq!(outcome, FetchOutcome::NotFound);

        cache.write(&key, b"cover").await.unwrap();

        let outcome = CacheFetcher.attempt(&track, &key, &cache).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Found);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FetcherKind::Placeholder.to_string(), "placeholder");
        assert_eq!(CacheFetcher.kind(), FetcherKind::Cache);
    }
}
