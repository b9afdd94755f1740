//! Local media cache
//!
//! Files live flat in the cache directory as `<media_id>.<ext>`. The
//! in-memory index is rebuilt from the directory at startup, so the
//! directory is the only persistent state.
//!
//! Resolution never blocks: a miss answers with the remote URL and queues a
//! background download.

use crate::cache::downloader::DownloadRequest;
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vitrine_common::events::{EventBus, KioskEvent};

/// URI scheme the renderer resolves against the cache directory
pub const MEDIA_URI_SCHEME: &str = "vitrine-media://";

/// Suffix of files still being downloaded
pub const PARTIAL_SUFFIX: &str = "part";

const DOWNLOAD_QUEUE_DEPTH: usize = 64;
const DEFAULT_EXTENSION: &str = "bin";

/// Where a media item will be played from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// URI handed to the renderer
    pub uri: String,
    /// Original source, used as fallback when the cached copy fails
    pub remote_url: String,
    pub cached: bool,
    pub local_path: Option<PathBuf>,
}

pub struct MediaCache {
    dir: PathBuf,
    index: RwLock<HashMap<String, PathBuf>>,
    pins: Mutex<HashMap<String, usize>>,
    in_flight: Mutex<HashSet<String>>,
    downloads: mpsc::Sender<DownloadRequest>,
    events: EventBus,
}

impl MediaCache {
    /// Create the cache and the receiving end of its download queue
    pub fn new(dir: impl Into<PathBuf>, events: EventBus) -> (Self, mpsc::Receiver<DownloadRequest>) {
        let (downloads, rx) = mpsc::channel(DOWNLOAD_QUEUE_DEPTH);
        let cache = Self {
            dir: dir.into(),
            index: RwLock::new(HashMap::new()),
            pins: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            downloads,
            events,
        };
        (cache, rx)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rebuild the index from the cache directory.
    ///
    /// Leftover partial downloads are deleted. Returns the number of
    /// indexed entries.
    pub async fn rescan(&self) -> Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut found = HashMap::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }

            if path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_SUFFIX) {
                debug!(path = %path.display(), "Removing partial download");
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }

            let Some(media_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_safe_media_id(media_id) {
                found.insert(media_id.to_string(), path.clone());
            }
        }

        let count = found.len();
        *write_lock(&self.index) = found;
        info!(count, dir = %self.dir.display(), "Media cache index rebuilt");
        Ok(count)
    }

    /// Decide where `media_id` plays from, queueing a download on a miss
    pub fn resolve(&self, media_id: &str, remote_url: &str) -> ResolvedMedia {
        if let Some(path) = self.local_path_for(media_id) {
            return ResolvedMedia {
                uri: format!("{}{}", MEDIA_URI_SCHEME, media_id),
                remote_url: remote_url.to_string(),
                cached: true,
                local_path: Some(path),
            };
        }

        self.enqueue_download(media_id, remote_url);
        ResolvedMedia {
            uri: remote_url.to_string(),
            remote_url: remote_url.to_string(),
            cached: false,
            local_path: None,
        }
    }

    pub fn is_cached(&self, media_id: &str) -> bool {
        read_lock(&self.index).contains_key(media_id)
    }

    pub fn local_path_for(&self, media_id: &str) -> Option<PathBuf> {
        read_lock(&self.index).get(media_id).cloned()
    }

    /// Map a `vitrine-media://` URI back to its file
    pub fn path_for_uri(&self, uri: &str) -> Option<PathBuf> {
        uri.strip_prefix(MEDIA_URI_SCHEME)
            .and_then(|media_id| self.local_path_for(media_id))
    }

    pub fn cached_count(&self) -> usize {
        read_lock(&self.index).len()
    }

    /// Queue a background download unless cached or already queued.
    ///
    /// Returns whether a new request was queued.
    pub fn enqueue_download(&self, media_id: &str, url: &str) -> bool {
        if !is_safe_media_id(media_id) {
            warn!(media_id, "Media id is not usable as a file name; not caching");
            return false;
        }
        if self.is_cached(media_id) {
            return false;
        }
        if !lock(&self.in_flight).insert(media_id.to_string()) {
            return false;
        }

        let request = DownloadRequest {
            media_id: media_id.to_string(),
            url: url.to_string(),
        };
        match self.downloads.try_send(request) {
            Ok(()) => {
                debug!(media_id, "Queued media download");
                true
            }
            Err(e) => {
                debug!(media_id, "Download queue unavailable: {}", e);
                lock(&self.in_flight).remove(media_id);
                false
            }
        }
    }

    /// Mark a download as finished, successful or not
    pub(crate) fn finish_download(&self, media_id: &str) {
        lock(&self.in_flight).remove(media_id);
    }

    /// Final path for a media item fetched from `url`
    pub fn target_path(&self, media_id: &str, url: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", media_id, extension_from_url(url)))
    }

    /// Make a verified file visible in the index
    pub(crate) fn commit(&self, media_id: &str, path: PathBuf) {
        write_lock(&self.index).insert(media_id.to_string(), path);
        info!(media_id, "Media cached");
        self.events.emit_lossy(KioskEvent::MediaCached {
            media_id: media_id.to_string(),
            timestamp: vitrine_common::time::now(),
        });
    }

    /// Keep `media_id` on disk until the guard drops
    pub fn pin(self: &Arc<Self>, media_id: &str) -> PinGuard {
        *lock(&self.pins).entry(media_id.to_string()).or_insert(0) += 1;
        PinGuard {
            cache: Arc::clone(self),
            media_id: media_id.to_string(),
        }
    }

    pub fn is_pinned(&self, media_id: &str) -> bool {
        lock(&self.pins).contains_key(media_id)
    }

    fn unpin(&self, media_id: &str) {
        let mut pins = lock(&self.pins);
        if let Some(count) = pins.get_mut(media_id) {
            *count -= 1;
            if *count == 0 {
                pins.remove(media_id);
            }
        }
    }

    /// Delete cached media no slot references. Pinned entries are kept.
    ///
    /// Returns the number of evicted entries.
    pub async fn evict_unreferenced(&self, referenced: &HashSet<String>) -> usize {
        let victims: Vec<(String, PathBuf)> = {
            let mut index = write_lock(&self.index);
            let pins = lock(&self.pins);
            let ids: Vec<String> = index
                .keys()
                .filter(|id| !referenced.contains(*id) && !pins.contains_key(*id))
                .cloned()
                .collect();
            ids.into_iter()
                .filter_map(|id| index.remove(&id).map(|path| (id, path)))
                .collect()
        };

        for (media_id, path) in &victims {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(media_id = %media_id, "Evicted unreferenced media"),
                Err(e) => warn!(media_id = %media_id, "Failed to delete cached media: {}", e),
            }
        }

        if !victims.is_empty() {
            info!(evicted = victims.len(), "Evicted unreferenced media");
        }
        victims.len()
    }
}

/// Holds a media item in the cache for the duration of a presentation
pub struct PinGuard {
    cache: Arc<MediaCache>,
    media_id: String,
}

impl PinGuard {
    pub fn media_id(&self) -> &str {
        &self.media_id
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.cache.unpin(&self.media_id);
    }
}

/// Media ids become file names, so only a conservative character set is cached
pub fn is_safe_media_id(media_id: &str) -> bool {
    !media_id.is_empty()
        && media_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// File extension taken from the URL path, ignoring query and fragment
pub fn extension_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && !ext.eq_ignore_ascii_case(PARTIAL_SUFFIX) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

// Lock poisoning only happens if a holder panicked; the guarded maps are
// still structurally valid, so keep going with the inner value.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_lock<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn cache_with_files(files: &[&str]) -> (TempDir, Arc<MediaCache>, mpsc::Receiver<DownloadRequest>) {
        let dir = TempDir::new().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), b"data").unwrap();
        }
        let (cache, rx) = MediaCache::new(dir.path(), EventBus::new(16));
        let cache = Arc::new(cache);
        cache.rescan().await.unwrap();
        (dir, cache, rx)
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_from_url("https://cdn.example/a/b/clip.MP4?sig=1"), "mp4");
        assert_eq!(extension_from_url("https://cdn.example/image.png#x"), "png");
        assert_eq!(extension_from_url("https://cdn.example/noext"), "bin");
        assert_eq!(extension_from_url("https://cdn.example/file.part"), "bin");
    }

    #[tokio::test]
    async fn test_rescan_indexes_files_and_drops_partials() {
        let (dir, cache, _rx) = cache_with_files(&["a1.png", "b2.mp4", "c3.part"]).await;

        assert_eq!(cache.cached_count(), 2);
        assert!(cache.is_cached("a1"));
        assert!(!cache.is_cached("c3"));
        assert!(!dir.path().join("c3.part").exists());
    }

    #[tokio::test]
    async fn test_hit_returns_media_uri() {
        let (_dir, cache, mut rx) = cache_with_files(&["a1.png"]).await;

        let resolved = cache.resolve("a1", "https://cdn.example/a1.png");
        assert!(resolved.cached);
        assert_eq!(resolved.uri, "vitrine-media://a1");
        assert_eq!(cache.path_for_uri(&resolved.uri), resolved.local_path);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_miss_returns_remote_and_queues_once() {
        let (_dir, cache, mut rx) = cache_with_files(&[]).await;

        let resolved = cache.resolve("m9", "https://cdn.example/m9.jpg");
        assert!(!resolved.cached);
        assert_eq!(resolved.uri, "https://cdn.example/m9.jpg");

        // Second miss while in flight does not queue again
        cache.resolve("m9", "https://cdn.example/m9.jpg");
        let request = rx.try_recv().unwrap();
        assert_eq!(request.media_id, "m9");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_evict_keeps_referenced_and_pinned() {
        let (dir, cache, _rx) = cache_with_files(&["keep.png", "pinned.png", "stale.png"]).await;
        let referenced: HashSet<String> = ["keep".to_string()].into_iter().collect();

        let guard = cache.pin("pinned");
        let evicted = cache.evict_unreferenced(&referenced).await;
        assert_eq!(evicted, 1);
        assert!(cache.is_cached("keep"));
        assert!(cache.is_cached("pinned"));
        assert!(!dir.path().join("stale.png").exists());

        drop(guard);
        assert!(!cache.is_pinned("pinned"));
        assert_eq!(cache.evict_unreferenced(&referenced).await, 1);
        assert!(!cache.is_cached("pinned"));
    }

    #[test]
    fn test_unsafe_media_ids() {
        assert!(is_safe_media_id("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!is_safe_media_id("../etc/passwd"));
        assert!(!is_safe_media_id(""));
    }
}
