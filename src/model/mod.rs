//! Core data model shared by the resolver, the library and the server.

use std::path::{Path, PathBuf};

/// A track whose cover is being resolved.
///
/// Supplied by a [`TrackSource`](crate::library::TrackSource) and immutable
/// for the duration of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Artist name as tagged
    pub artist: String,
    /// Album title as tagged
    pub album: String,
    /// Absolute path of the audio file
    pub path: PathBuf,
}

impl Track {
    pub fn new(artist: impl Into<String>, album: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
            path: path.into(),
        }
    }

    /// Directory holding the audio file. A bare file name lives in `.`,
    /// a track without a file has none.
    pub fn folder(&self) -> Option<&Path> {
        match self.path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Some(Path::new(".")),
            parent => parent,
        }
    }
}
