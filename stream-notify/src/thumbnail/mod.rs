//! Thumbnail asset cache.
//!
//! Each entity owns at most one preview file, named `<login>_<token>.jpg`.
//! The token is a strictly increasing millisecond timestamp, so a new live
//! session never reuses an old file name (chat clients cache attachments by
//! URL). Ownership is decided by parsing the file name, never by prefix.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use twitch_helix::models::sized_thumbnail_url;
use url::Url;

use crate::Result;
use crate::utils::fs::{ensure_dir_all_with_op, io_error, remove_file_if_exists};

const EXTENSION: &str = ".jpg";

#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            timeout: Duration::from_secs(10),
        }
    }
}

/// A freshly downloaded preview, ready to attach to a notification.
#[derive(Debug, Clone)]
pub struct ThumbnailAsset {
    pub path: PathBuf,
    pub file_name: String,
    pub session_token: i64,
    pub bytes: Vec<u8>,
}

pub struct AssetCache {
    dir: PathBuf,
    http: reqwest::Client,
    config: ThumbnailConfig,
    last_token: AtomicI64,
    /// Serializes evict+write per login.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AssetCache {
    pub async fn open(
        dir: impl Into<PathBuf>,
        http: reqwest::Client,
        config: ThumbnailConfig,
    ) -> Result<Self> {
        let dir = dir.into();
        ensure_dir_all_with_op("creating thumbnail directory", &dir).await?;
        Ok(Self {
            dir,
            http,
            config,
            last_token: AtomicI64::new(0),
            locks: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next session token: the current time in ms, bumped past the last one.
    pub fn next_session_token(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last_token.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self.last_token.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Replace the entity's cached preview with a fresh download.
    ///
    /// Old files are always evicted first. Any download failure yields `None`;
    /// the notification goes out without an image.
    pub async fn refresh(&self, name: &str, template: &str) -> Option<ThumbnailAsset> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        if let Err(e) = self.evict_unlocked(name).await {
            warn!(streamer = %name, error = %e, "Failed to evict old thumbnails");
        }

        let session_token = self.next_session_token();
        let url = match self.source_url(template, session_token) {
            Ok(url) => url,
            Err(e) => {
                warn!(streamer = %name, template, error = %e, "Invalid thumbnail url");
                return None;
            }
        };

        let bytes = match self.download(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(streamer = %name, error = %e, "Thumbnail download failed");
                return None;
            }
        };

        let file_name = format!("{name}_{session_token}{EXTENSION}");
        let path = self.dir.join(&file_name);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            warn!(error = %io_error("writing", &path, e), "Failed to store thumbnail");
            let _ = remove_file_if_exists(&path).await;
            return None;
        }

        debug!(streamer = %name, file = %file_name, size = bytes.len(), "Thumbnail cached");
        Some(ThumbnailAsset {
            path,
            file_name,
            session_token,
            bytes,
        })
    }

    /// Remove every cached preview owned by `name`. Returns how many were removed.
    pub async fn evict(&self, name: &str) -> Result<usize> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.evict_unlocked(name).await
    }

    /// Paths of the previews currently owned by `name`.
    pub async fn assets_of(&self, name: &str) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error("reading thumbnail directory", &self.dir, e))?;

        let mut owned = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("reading thumbnail directory", &self.dir, e))?
        {
            let file_name = entry.file_name();
            if let Some(file_name) = file_name.to_str()
                && owner_of(file_name) == Some(name)
            {
                owned.push(entry.path());
            }
        }
        owned.sort();
        Ok(owned)
    }

    async fn evict_unlocked(&self, name: &str) -> Result<usize> {
        let mut removed = 0;
        for path in self.assets_of(name).await? {
            if remove_file_if_exists(&path).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(streamer = %name, removed, "Evicted thumbnails");
        }
        Ok(removed)
    }

    fn source_url(&self, template: &str, session_token: i64) -> std::result::Result<Url, url::ParseError> {
        let sized = sized_thumbnail_url(template, self.config.width, self.config.height);
        let mut url = Url::parse(&sized)?;
        url.query_pairs_mut()
            .append_pair("t", &session_token.to_string());
        Ok(url)
    }

    async fn download(&self, url: Url) -> std::result::Result<Vec<u8>, String> {
        let fetch = async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("unexpected status {status}"));
            }
            let body = response.bytes().await.map_err(|e| e.to_string())?;
            if body.is_empty() {
                return Err("empty body".to_string());
            }
            Ok(body.to_vec())
        };

        tokio::time::timeout(self.config.timeout, fetch)
            .await
            .map_err(|_| format!("timed out after {:?}", self.config.timeout))?
    }
}

/// Owner login of a cache file name, if it follows `<login>_<digits>.jpg`.
pub fn owner_of(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(EXTENSION)?;
    let (owner, token) = stem.rsplit_once('_')?;
    if owner.is_empty() || token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(owner)
}
