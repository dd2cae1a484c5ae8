//! Fetch covers through the remote lookup service.
//!
//! Asks the service for the album's image list, takes the URL at the
//! configured index and streams the referenced bytes into the cache. Every
//! failure on this path is reported as not-found; no timeout is applied.

use std::sync::Arc;

use async_trait::async_trait;

use super::cache::CoverCache;
use super::fetcher::{FetchOutcome, Fetcher, FetcherKind};
use super::key::CacheKey;
use crate::error::Result;
use crate::lookup::traits::album_image_url;
use crate::lookup::{LookupApi, LookupError};
use crate::model::Track;

/// Index of the "large" entry in Last.fm's smallest-to-largest image list.
pub const DEFAULT_IMAGE_INDEX: usize = 2;

/// Downloads the album image advertised by the lookup service.
pub struct RemoteLookupFetcher {
    api: Arc<dyn LookupApi>,
    http_client: reqwest::Client,
    image_index: usize,
}

impl RemoteLookupFetcher {
    pub fn new(api: Arc<dyn LookupApi>, http_client: reqwest::Client) -> Self {
        Self {
            api,
            http_client,
            image_index: DEFAULT_IMAGE_INDEX,
        }
    }

    /// Use a different position in the image list.
    pub fn with_image_index(mut self, index: usize) -> Self {
        self.image_index = index;
        self
    }

    async fn download(&self, url: &str, key: &CacheKey, cache: &CoverCache) -> Result<()> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(LookupError::network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Http(status.as_u16()).into());
        }

        cache
            .write_stream(key, Box::pin(response.bytes_stream()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Fetcher for RemoteLookupFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Remote
    }

    async fn attempt(
        &self,
        track: &Track,
        key: &CacheKey,
        cache: &CoverCache,
    ) -> Result<FetchOutcome> {
        let url =
            match album_image_url(self.api.as_ref(), &track.artist, &track.album, self.image_index)
                .await
            {
                Ok(Some(url)) => url,
                Ok(None) => {
                    tracing::debug!("Lookup has no image for {} / {}", track.artist, track.album);
                    return Ok(FetchOutcome::NotFound);
                }
                Err(e) => {
                    tracing::debug!("error getting cover from lookup service: {}", e);
                    return Ok(FetchOutcome::NotFound);
                }
            };

        tracing::debug!("downloading cover file: {}", url);
        match self.download(&url, key, cache).await {
            Ok(()) => Ok(FetchOutcome::Found),
            Err(e) => {
                tracing::warn!("Cover download from {} failed: {}", url, e);
                Ok(FetchOutcome::NotFound)
            }
        }
    }
}
