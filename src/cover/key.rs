//! Cache key derivation.
//!
//! A key is `encode(artist) + "_" + encode(album)`, where `encode` is
//! percent-encoding that also escapes `_` and a leading `.`. The separator
//! therefore never appears inside either half, the key is always a single
//! safe file name, and it never starts with a dot. Dot-prefixed names in the
//! cache directory belong to unfinished writes.

use std::fmt;
use std::path::{Component, Path};

/// Separator between the encoded artist and album.
const SEPARATOR: char = '_';

/// Deterministic, filesystem-safe identifier for one artist/album pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for an artist/album pair.
    pub fn derive(artist: &str, album: &str) -> Self {
        Self(format!("{}{}{}", encode(artist), SEPARATOR, encode(album)))
    }

    /// Accept an externally supplied key if it is a single plain file name
    /// that a derived key could have produced.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.starts_with('.') || raw.contains(['/', '\\', '\0']) {
            return None;
        }
        let mut components = Path::new(raw).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(Self(raw.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for CacheKey {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

fn encode(part: &str) -> String {
    let encoded = urlencoding::encode(part).replace(SEPARATOR, "%5F");
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => encoded,
    }
}
