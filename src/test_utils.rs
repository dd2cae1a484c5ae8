//! Test utilities and fixtures for albumart tests.
//!
//! Audio fixtures are built in memory instead of being checked in: a run of
//! silent MPEG-1 Layer III frames, optionally preceded by an ID3v2.3 tag
//! holding one APIC (attached picture) frame.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::mp3_with_cover;
//!
//! std::fs::write(&path, mp3_with_cover(b"jpeg bytes"))?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::cover::{CacheKey, CoverCache, FetchOutcome, Fetcher, FetcherKind};
use crate::error::Result;
use crate::model::Track;

/// MPEG-1 Layer III, 128 kbps, 44.1 kHz, no padding, joint stereo.
const FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];
/// 144 * 128000 / 44100, rounded down.
const FRAME_LEN: usize = 417;
const FRAME_COUNT: usize = 16;

/// Silent MP3 stream with no tags at all.
pub fn mp3_without_art() -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_LEN];
    frame[..4].copy_from_slice(&FRAME_HEADER);
    frame.repeat(FRAME_COUNT)
}

/// Silent MP3 stream whose ID3v2.3 tag embeds `picture` as the front cover.
pub fn mp3_with_cover(picture: &[u8]) -> Vec<u8> {
    let mut apic = Vec::new();
    apic.push(0x00); // ISO-8859-1 text encoding
    apic.extend_from_slice(b"image/jpeg\0");
    apic.push(0x03); // Cover (front)
    apic.push(0x00); // Empty description
    apic.extend_from_slice(picture);

    let mut frame = Vec::new();
    frame.extend_from_slice(b"APIC");
    frame.extend_from_slice(&(apic.len() as u32).to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]); // Frame flags
    frame.extend_from_slice(&apic);

    let mut out = Vec::new();
    out.extend_from_slice(b"ID3");
    out.extend_from_slice(&[0x03, 0x00, 0x00]); // v2.3.0, no flags
    out.extend_from_slice(&synchsafe(frame.len() as u32));
    out.extend_from_slice(&frame);
    out.extend_from_slice(&mp3_without_art());
    out
}

/// Encode a tag size as four 7-bit bytes.
fn synchsafe(n: u32) -> [u8; 4] {
    [
        ((n >> 21) & 0x7F) as u8,
        ((n >> 14) & 0x7F) as u8,
        ((n >> 7) & 0x7F) as u8,
        (n & 0x7F) as u8,
    ]
}

/// Serve `body` at `/cover.jpg` on an ephemeral local port.
///
/// Returns the base URL (`http://127.0.0.1:PORT`). Other paths answer 404.
pub async fn spawn_image_server(body: Vec<u8>) -> String {
    use axum::{Router, routing::get};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let app = Router::new().route("/cover.jpg", get(move || async move { body }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Fetcher with a fixed answer that counts its invocations.
///
/// A `found` fetcher honours the fetcher contract and writes a small
/// payload under the key before reporting the hit.
pub struct Scripted {
    kind: FetcherKind,
    outcome: FetchOutcome,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn found(kind: FetcherKind, calls: Arc<AtomicUsize>) -> Self {
        Self {
            kind,
            outcome: FetchOutcome::Found,
            calls,
        }
    }

    pub fn not_found(kind: FetcherKind, calls: Arc<AtomicUsize>) -> Self {
        Self {
            kind,
            outcome: FetchOutcome::NotFound,
            calls,
        }
    }
}

#[async_trait]
impl Fetcher for Scripted {
    fn kind(&self) -> FetcherKind {
        self.kind
    }

    async fn attempt(
        &self,
        _track: &Track,
        key: &CacheKey,
        cache: &CoverCache,
    ) -> Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent resolutions a chance to interleave
        tokio::task::yield_now().await;
        if self.outcome == FetchOutcome::Found {
            cache.write(key, b"scripted cover").await?;
        }
        Ok(self.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_without_art_starts_with_frame_sync() {
        let bytes = mp3_without_art();
        assert_eq!(&bytes[..4], &FRAME_HEADER);
        assert_eq!(bytes.len(), FRAME_LEN * FRAME_COUNT);
    }

    #[test]
    fn test_mp3_with_cover_layout() {
        let bytes = mp3_with_cover(b"pic");
        assert_eq!(&bytes[..3], b"ID3");
        // 10 byte APIC header + 1 + 11 + 1 + 1 + 3 byte body
        assert_eq!(&bytes[6..10], &[0, 0, 0, 27]);
        assert_eq!(&bytes[10..14], b"APIC");
        assert_eq!(&bytes[37..41], &FRAME_HEADER);
    }

    #[test]
    fn test_synchsafe() {
        assert_eq!(synchsafe(0), [0, 0, 0, 0]);
        assert_eq!(synchsafe(127), [0, 0, 0, 127]);
        assert_eq!(synchsafe(128), [0, 0, 1, 0]);
        assert_eq!(synchsafe(1000), [0, 0, 7, 104]);
    }

    #[tokio::test]
    async fn test_image_server() {
        let base = spawn_image_server(b"bytes".to_vec()).await;
        let body = reqwest::get(format!("{}/cover.jpg", base))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&body[..], b"bytes");

        let missing = reqwest::get(format!("{}/other.jpg", base)).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
