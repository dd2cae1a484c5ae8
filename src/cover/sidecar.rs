//! Pick up image files sitting next to the audio file.
//!
//! Any regular file with an image extension qualifies, whatever its name.
//! When a folder holds several, the first in lexicographic file-name order
//! wins, so the choice does not depend on the platform's listing order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::cache::CoverCache;
use super::fetcher::{FetchOutcome, Fetcher, FetcherKind};
use super::key::CacheKey;
use crate::error::{Result, ResultExt};
use crate::model::Track;

/// Supported image extensions (lowercase for matching)
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Find the first image file in `folder`.
///
/// A missing folder has no images. Any other listing failure is returned.
pub async fn find_folder_image(folder: &Path) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(format!("listing directory {}", folder.display()));
        }
    };

    let mut best: Option<PathBuf> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(format!("listing directory {}", folder.display()))?
    {
        let path = entry.path();
        if !is_image(&path) {
            continue;
        }
        // Follows symlinks, so a linked cover.jpg still counts
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if best.as_ref().is_none_or(|b| path.file_name() < b.file_name()) {
            best = Some(path);
        }
    }

    Ok(best)
}

/// Caches the first image found in the audio file's directory.
pub struct FolderArtFetcher;

#[async_trait]
impl Fetcher for FolderArtFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Folder
    }

    async fn attempt(
        &self,
        track: &Track,
        key: &CacheKey,
        cache: &CoverCache,
    ) -> Result<FetchOutcome> {
        let Some(folder) = track.folder() else {
            return Ok(FetchOutcome::NotFound);
        };

        let Some(image) = find_folder_image(folder).await? else {
            tracing::debug!("No image file in {:?}", folder);
            return Ok(FetchOutcome::NotFound);
        };

        tracing::debug!("Using folder image {:?}", image);
        cache.copy_from(key, &image).await?;
        Ok(FetchOutcome::Found)
    }
}
