//! Writing a cached cover to an HTTP response.

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::cover::{CacheKey, CoverCache};

/// Content type announced for every cover.
pub const COVER_CONTENT_TYPE: &str = "image/jpeg";

/// Stream the entry for `key`, or end the response with an empty body.
///
/// An absent key or an entry that vanished since resolution is not an
/// error to the client: it just receives nothing.
pub async fn cover_response(cache: &CoverCache, key: Option<&CacheKey>) -> Response {
    let Some(key) = key else {
        return empty_response();
    };

    let (file, len) = match cache.open_entry(key).await {
        Ok(entry) => entry,
        Err(e) if e.is_not_found() => {
            tracing::debug!("Cover {} disappeared before serving", key);
            return empty_response();
        }
        Err(e) => {
            tracing::error!("Failed to open cover {}: {}", key, e);
            return empty_response();
        }
    };

    tracing::debug!("image size: {}", len);
    (
        [
            (header::CONTENT_TYPE, COVER_CONTENT_TYPE.to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// 200 with no body.
pub fn empty_response() -> Response {
    StatusCode::OK.into_response()
}
