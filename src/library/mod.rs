//! Track metadata supplied to the resolver.
//!
//! The music library itself lives elsewhere; the server only needs to know
//! which track is current. [`TrackSource`] is that seam. [`NowPlaying`] is a
//! shared, settable implementation, and [`read_track`] builds a [`Track`]
//! from an audio file's own tags.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::Accessor;

use crate::error::{Error, Result};
use crate::model::Track;

/// Provides the track whose cover `/albumart` should show.
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn current_track(&self) -> Option<Track>;
}

/// The currently playing track, updated by the player.
#[derive(Debug, Clone, Default)]
pub struct NowPlaying {
    current: Arc<parking_lot::RwLock<Option<Track>>>,
}

impl NowPlaying {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current track (`None` when playback stops).
    pub fn set(&self, track: Option<Track>) {
        if let Some(track) = &track {
            tracing::debug!("Now playing {} / {} ({:?})", track.artist, track.album, track.path);
        }
        *self.current.write() = track;
    }

    pub fn get(&self) -> Option<Track> {
        self.current.read().clone()
    }
}

#[async_trait]
impl TrackSource for NowPlaying {
    async fn current_track(&self) -> Option<Track> {
        self.get()
    }
}

/// Build a [`Track`] from the artist and album tags of an audio file.
///
/// Missing tags fall back to "Unknown Artist" / "Unknown Album".
pub fn read_track(path: &Path) -> Result<Track> {
    let tagged_file = Probe::open(path)
        .map_err(|e| Error::parse(path, e.to_string()))?
        .read()
        .map_err(|e| Error::parse(path, e.to_string()))?;

    // Get the primary tag, or fall back to the first available tag
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let artist = tag
        .and_then(|t| t.artist().map(|s| s.to_string()))
        .unwrap_or_else(|| "Unknown Artist".to_string());

    let album = tag
        .and_then(|t| t.album().map(|s| s.to_string()))
        .unwrap_or_else(|| "Unknown Album".to_string());

    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Ok(Track { artist, album, path })
}
