//! Trait definition for the remote lookup service.
//!
//! This trait enables dependency injection and mocking for tests.
//! Production code uses [`LastFmClient`](super::LastFmClient), while tests
//! substitute the mock in [`mocks`].

use async_trait::async_trait;
use serde_json::Value;

use super::domain::LookupError;
use super::dto::AlbumInfoResponse;

/// Method name for album metadata.
pub const ALBUM_GET_INFO: &str = "album.getInfo";

/// A remote metadata service answering `request(method, params)`.
#[async_trait]
pub trait LookupApi: Send + Sync {
    /// Invoke `method` with the given parameters, returning the reply data.
    async fn request(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, LookupError>;
}

#[async_trait]
impl LookupApi for super::LastFmClient {
    async fn request(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, LookupError> {
        self.request(method, params).await
    }
}

/// Look up an album and return the image URL at `index`, if any.
///
/// An empty URL at that index is reported as `Ok(None)`.
pub async fn album_image_url(
    api: &dyn LookupApi,
    artist: &str,
    album: &str,
    index: usize,
) -> Result<Option<String>, LookupError> {
    let data = api
        .request(ALBUM_GET_INFO, &[("artist", artist), ("album", album)])
        .await?;

    let info: AlbumInfoResponse =
        serde_json::from_value(data).map_err(|e| LookupError::Parse(e.to_string()))?;

    Ok(info.image_url(index).map(str::to_string))
}
