//! HTTP surface for cover art.
//!
//! - `GET /albumartrender` - whether the cover feature is enabled
//! - `GET /albumart` - cover of the current track, or of the album named by
//!   the `artist`/`album` query parameters
//! - `GET /albumart/{key}` - an existing cache entry, by key
//!
//! When the feature is disabled the `/albumart` routes are not mounted.

mod serve;

pub use serve::{COVER_CONTENT_TYPE, cover_response, empty_response};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::cover::{CacheKey, CoverResolver};
use crate::library::TrackSource;
use crate::model::Track;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub resolver: CoverResolver,
    pub tracks: Arc<dyn TrackSource>,
    pub enabled: bool,
}

/// Explicit album selection for `/albumart`.
///
/// Only names are taken from the client. The track has no file, so the
/// local file stages never run for it.
#[derive(Debug, Default, Deserialize)]
pub struct CoverQuery {
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl CoverQuery {
    fn track(self) -> Option<Track> {
        match (self.artist, self.album) {
            (Some(artist), Some(album)) => Some(Track::new(artist, album, PathBuf::new())),
            _ => None,
        }
    }
}

/// Build the router for `state`.
pub fn router(state: AppState) -> Router {
    let routes = Router::new().route("/albumartrender", get(render_enabled));

    let routes = if state.enabled {
        routes
            .route("/albumart", get(current_cover))
            .route("/albumart/{key}", get(cached_cover))
    } else {
        routes
    };

    routes.with_state(state)
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn run(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Serving album art on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl+C received, shutting down");
        })
        .await
}

async fn render_enabled(State(state): State<AppState>) -> Json<bool> {
    Json(state.enabled)
}

async fn current_cover(State(state): State<AppState>, Query(query): Query<CoverQuery>) -> Response {
    let track = match query.track() {
        Some(track) => Some(track),
        None => state.tracks.current_track().await,
    };

    let Some(track) = track else {
        tracing::debug!("No current track, nothing to serve");
        return empty_response();
    };

    match state.resolver.resolve(&track).await {
        Ok(resolution) => cover_response(state.resolver.cache(), resolution.served_key()).await,
        Err(e) => {
            tracing::error!("Cover resolution failed for {} / {}: {}", track.artist, track.album, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn cached_cover(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let key = CacheKey::parse(&raw);
    if key.is_none() {
        tracing::warn!("Rejected cover key {:?}", raw);
    }
    cover_response(state.resolver.cache(), key.as_ref()).await
}
