//! Extract cover art embedded in audio file tags.
//!
//! Uses lofty to read picture data from:
//! - ID3v2 tags (MP3)
//! - Vorbis comments (FLAC, OGG)
//! - MP4 atoms (M4A/AAC)

use std::io::{BufReader, Read, Seek};

use async_trait::async_trait;
use lofty::error::LoftyError;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;

use super::cache::CoverCache;
use super::fetcher::{FetchOutcome, Fetcher, FetcherKind};
use super::key::CacheKey;
use crate::error::Result;
use crate::model::Track;

/// Read every embedded picture from an audio stream, in tag order.
///
/// The container format is sniffed from the content, not a file name.
pub fn embedded_pictures<R: Read + Seek>(reader: R) -> std::result::Result<Vec<Vec<u8>>, LoftyError> {
    let tagged_file = Probe::new(reader).guess_file_type()?.read()?;

    Ok(tagged_file
        .tags()
        .iter()
        .flat_map(|tag| tag.pictures())
        .map(|picture| picture.data().to_vec())
        .collect())
}

/// Caches the first picture embedded in the track's audio file.
pub struct EmbeddedArtFetcher;

#[async_trait]
impl Fetcher for EmbeddedArtFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Embedded
    }

    async fn attempt(
        &self,
        track: &Track,
        key: &CacheKey,
        cache: &CoverCache,
    ) -> Result<FetchOutcome> {
        if track.path.as_os_str().is_empty() {
            return Ok(FetchOutcome::NotFound);
        }

        let file = match tokio::fs::File::open(&track.path).await {
            Ok(file) => file.into_std().await,
            Err(e) => {
                tracing::warn!("Audio file {:?} not readable: {}", track.path, e);
                return Ok(FetchOutcome::NotFound);
            }
        };

        // Tag parsing is synchronous; keep it off the async workers
        let parsed =
            tokio::task::spawn_blocking(move || embedded_pictures(BufReader::new(file))).await;

        let pictures = match parsed {
            Ok(Ok(pictures)) => pictures,
            Ok(Err(e)) => {
                tracing::debug!("Could not parse tags of {:?}: {}", track.path, e);
                return Ok(FetchOutcome::NotFound);
            }
            Err(e) => {
                tracing::warn!("Tag parsing task failed for {:?}: {}", track.path, e);
                return Ok(FetchOutcome::NotFound);
            }
        };

        let Some(picture) = pictures.first() else {
            tracing::debug!("No embedded picture in {:?}", track.path);
            return Ok(FetchOutcome::NotFound);
        };

        cache.write(key, picture).await?;
        Ok(FetchOutcome::Found)
    }
}
