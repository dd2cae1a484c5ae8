//! Cover art disk cache.
//!
//! One flat directory, one file per [`CacheKey`], no extension. The presence
//! of the file is the authoritative "cached" state.
//!
//! Writes land in a temp file next to the entry and are renamed into place
//! once complete, so a concurrent reader sees either the old entry, the new
//! one, or nothing. Never a truncated file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::key::CacheKey;
use crate::error::{Error, Result, ResultExt};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cover art disk cache.
#[derive(Debug, Clone)]
pub struct CoverCache {
    cache_dir: PathBuf,
}

impl CoverCache {
    /// Open the cache in `cache_dir`, creating the directory if missing.
    pub async fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !fs::try_exists(&cache_dir).await.unwrap_or(false) {
            tracing::info!("Creating cover cache directory {:?}", cache_dir);
        }
        fs::create_dir_all(&cache_dir)
            .await
            .with_context(format!("creating cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    /// Default location (user cache directory).
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("albumart")
            .join("covers")
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the entry for `key` (whether or not it exists).
    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key)
    }

    /// Check if an entry exists.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        fs::metadata(self.path(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read a whole entry into memory.
    pub async fn read(&self, key: &CacheKey) -> Result<Vec<u8>> {
        let path = self.path(key);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(path)),
            Err(e) => Err(e.into()),
        }
    }

    /// Open an entry for streaming. Returns the handle and its length.
    ///
    /// The length comes from the opened handle, so it matches the bytes the
    /// handle will yield even if the entry is replaced meanwhile.
    pub async fn open_entry(&self, key: &CacheKey) -> Result<(fs::File, u64)> {
        let path = self.path(key);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(path));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Store bytes under `key`, replacing any previous entry.
    pub async fn write(&self, key: &CacheKey, data: &[u8]) -> Result<PathBuf> {
        let temp = self.temp_path(key);
        let written = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        self.commit(key, temp, written).await
    }

    /// Stream chunks into the entry for `key`.
    ///
    /// A failing chunk aborts the write and leaves any previous entry intact.
    pub async fn write_stream<S, B, E>(&self, key: &CacheKey, mut stream: S) -> Result<PathBuf>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let temp = self.temp_path(key);
        let written = async {
            let mut file = fs::File::create(&temp).await?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| std::io::Error::other(e.to_string()))?;
                file.write_all(chunk.as_ref()).await?;
            }
            file.sync_all().await
        }
        .await;
        self.commit(key, temp, written).await
    }

    /// Copy a local file into the entry for `key`.
    pub async fn copy_from(&self, key: &CacheKey, source: &Path) -> Result<PathBuf> {
        let temp = self.temp_path(key);
        let copied = fs::copy(source, &temp).await.map(|_| ());
        self.commit(key, temp, copied).await
    }

    /// Number of entries in the cache.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    /// Total size of all entries in bytes.
    pub async fn size_bytes(&self) -> Result<u64> {
        Ok(self.entries().await?.iter().map(|(_, len)| len).sum())
    }

    async fn entries(&self) -> Result<Vec<(PathBuf, u64)>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if is_temp(&path) {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                entries.push((path, meta.len()));
            }
        }
        Ok(entries)
    }

    fn temp_path(&self, key: &CacheKey) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!(".{}.{}.{}.tmp", key, std::process::id(), n))
    }

    /// Rename a finished temp file over the entry, or clean it up on failure.
    async fn commit(
        &self,
        key: &CacheKey,
        temp: PathBuf,
        written: std::io::Result<()>,
    ) -> Result<PathBuf> {
        let path = self.path(key);
        let result = match written {
            Ok(()) => fs::rename(&temp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(Error::Io(e).context(format!("writing cache entry {}", key)));
        }
        tracing::debug!("Cached cover {:?}", path);
        Ok(path)
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
}
