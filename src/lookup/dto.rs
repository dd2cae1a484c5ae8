//! Last.fm API Data Transfer Objects
//!
//! Only the fields the cover fetcher reads are modelled. Everything else in
//! the reply is ignored by serde.
//!
//! API Reference: https://www.last.fm/api/show/album.getInfo

use serde::{Deserialize, Serialize};

/// Reply body of `album.getInfo`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumInfoResponse {
    pub album: AlbumInfo,
}

/// Album section of an `album.getInfo` reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    /// Image descriptors ordered from smallest to largest
    #[serde(default)]
    pub image: Vec<Image>,
}

/// A single image descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    /// Image URL (empty when Last.fm has no art at this size)
    #[serde(rename = "#text", default)]
    pub url: String,
    /// small, medium, large, extralarge, mega
    #[serde(default)]
    pub size: String,
}

/// Error body returned by the service, often with a 200 status.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: i64,
    #[serde(default)]
    pub message: String,
}

impl AlbumInfoResponse {
    /// URL of the image at `index`, if present and non-empty.
    pub fn image_url(&self, index: usize) -> Option<&str> {
        self.album
            .image
            .get(index)
            .map(|image| image.url.as_str())
            .filter(|url| !url.is_empty())
    }
}
