//! Last-resort cover: a small image compiled into the binary.

use async_trait::async_trait;

use super::cache::CoverCache;
use super::fetcher::{FetchOutcome, Fetcher, FetcherKind};
use super::key::CacheKey;
use crate::error::Result;
use crate::model::Track;

/// Image served when no real cover can be found.
pub const PLACEHOLDER_IMAGE: &[u8] = include_bytes!("../../assets/placeholder.jpg");

/// Writes [`PLACEHOLDER_IMAGE`] under the track's key.
///
/// Has no external dependency; only a failing cache write makes it report
/// not-found.
pub struct PlaceholderFetcher;

#[async_trait]
impl Fetcher for PlaceholderFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Placeholder
    }

    async fn attempt(
        &self,
        _track: &Track,
        key: &CacheKey,
        cache: &CoverCache,
    ) -> Result<FetchOutcome> {
        match cache.write(key, PLACEHOLDER_IMAGE).await {
            Ok(_) => Ok(FetchOutcome::Found),
            Err(e) => {
                tracing::error!("Failed to write placeholder cover: {}", e);
                Ok(FetchOutcome::NotFound)
            }
        }
    }
}
