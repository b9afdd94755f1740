//! Media cache and its download pipeline

pub mod downloader;
pub mod media_cache;

pub use downloader::{DownloadRequest, Downloader, HttpMediaSource, MediaSource};
pub use media_cache::{MediaCache, PinGuard, ResolvedMedia, MEDIA_URI_SCHEME};

use crate::playlist::PlaylistSnapshot;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Bring the cache in line with a playlist snapshot.
///
/// Queues every referenced media item not yet cached, then evicts cached
/// items no slot references.
pub async fn sync_with_playlist(cache: &MediaCache, snapshot: &PlaylistSnapshot) {
    let mut queued = 0;
    for (media_id, url) in snapshot.downloadable_media() {
        if cache.enqueue_download(&media_id, &url) {
            queued += 1;
        }
    }
    let evicted = cache.evict_unreferenced(&snapshot.referenced_media()).await;
    debug!(queued, evicted, "Cache synced with playlist");
}

/// Re-sync the cache whenever the playlist snapshot changes
pub fn spawn_prefetcher(
    cache: Arc<MediaCache>,
    mut updates: watch::Receiver<Arc<PlaylistSnapshot>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let snapshot = updates.borrow_and_update().clone();
            // The initial empty snapshot says nothing about what to keep
            if snapshot.fetched_at().is_some() {
                sync_with_playlist(&cache, &snapshot).await;
            }
            if updates.changed().await.is_err() {
                break;
            }
        }
    })
}
