//! Playlist synchronization
//!
//! Keeps an immutable [`PlaylistSnapshot`] of the terminal's slot
//! assignments. Every change notification from the backend triggers a full
//! re-pull; the snapshot is replaced wholesale, never patched. A failed pull
//! keeps the last known-good snapshot in place.
//!
//! The scheduler reads the snapshot lazily through a `watch` receiver and
//! is never called from here.

use crate::backend::{ChangeStream, ContentApi};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitrine_common::events::{EventBus, KioskEvent};
use vitrine_common::models::{PlaylistSlotContent, SlotAssignment, SlotContent};

/// Slot index to assignment map at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSnapshot {
    slots: BTreeMap<usize, SlotAssignment>,
    fetched_at: Option<DateTime<Utc>>,
}

impl PlaylistSnapshot {
    /// Snapshot before the first successful pull
    pub fn empty() -> Self {
        Self {
            slots: BTreeMap::new(),
            fetched_at: None,
        }
    }

    /// Build from the backend's slot rows.
    ///
    /// Rows that cannot be interpreted are dropped. When two rows claim the
    /// same slot index the first one wins.
    pub fn from_wire(rows: Vec<PlaylistSlotContent>, fetched_at: DateTime<Utc>) -> Self {
        let mut slots: BTreeMap<usize, SlotAssignment> = BTreeMap::new();

        for row in rows {
            let raw_index = row.slot_index;
            let assignment = match SlotAssignment::try_from(row) {
                Ok(assignment) => assignment,
                Err(e) => {
                    warn!(slot = raw_index, "Dropping uninterpretable playlist entry: {}", e);
                    continue;
                }
            };

            if let Some(existing) = slots.get(&assignment.slot_index) {
                warn!(
                    slot = assignment.slot_index,
                    kept = existing.content.media_id().unwrap_or("-"),
                    dropped = assignment.content.media_id().unwrap_or("-"),
                    "Duplicate slot index in playlist; keeping the first entry"
                );
                continue;
            }
            slots.insert(assignment.slot_index, assignment);
        }

        Self {
            slots,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn get(&self, slot_index: usize) -> Option<&SlotAssignment> {
        self.slots.get(&slot_index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotAssignment> {
        self.slots.values()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Media ids referenced by any slot
    pub fn referenced_media(&self) -> HashSet<String> {
        self.iter()
            .filter_map(|a| a.content.media_id())
            .map(str::to_string)
            .collect()
    }

    /// `(media_id, url)` of every downloadable media item
    pub fn downloadable_media(&self) -> Vec<(String, String)> {
        self.iter()
            .filter_map(|a| match &a.content {
                SlotContent::Media { media_id, url, .. } => Some((media_id.clone(), url.clone())),
                SlotContent::DynamicFeed { .. } | SlotContent::Empty => None,
            })
            .collect()
    }
}

impl Default for PlaylistSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

pub struct PlaylistSync {
    api: Arc<dyn ContentApi>,
    terminal_id: String,
    events: EventBus,
    snapshot: watch::Sender<Arc<PlaylistSnapshot>>,
}

impl PlaylistSync {
    pub fn new(api: Arc<dyn ContentApi>, terminal_id: impl Into<String>, events: EventBus) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(PlaylistSnapshot::empty()));
        Self {
            api,
            terminal_id: terminal_id.into(),
            events,
            snapshot,
        }
    }

    /// Current snapshot; cheap to call
    pub fn current_slots(&self) -> Arc<PlaylistSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every snapshot replacement
    pub fn subscribe(&self) -> watch::Receiver<Arc<PlaylistSnapshot>> {
        self.snapshot.subscribe()
    }

    /// Pull the full playlist and replace the snapshot.
    ///
    /// Returns the new slot count. On error the previous snapshot stays.
    pub async fn refresh(&self) -> Result<usize> {
        let rows = match self.api.assigned_playlist(&self.terminal_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Playlist pull failed, keeping last known-good snapshot: {}", e);
                self.events.emit_lossy(KioskEvent::PlaylistPullFailed {
                    reason: e.to_string(),
                    timestamp: vitrine_common::time::now(),
                });
                return Err(e);
            }
        };

        let snapshot = PlaylistSnapshot::from_wire(rows, vitrine_common::time::now());
        let slot_count = snapshot.len();
        self.snapshot.send_replace(Arc::new(snapshot));

        info!(slot_count, "Playlist snapshot updated");
        self.events.emit_lossy(KioskEvent::PlaylistUpdated {
            slot_count,
            timestamp: vitrine_common::time::now(),
        });
        Ok(slot_count)
    }

    /// Follow backend change notifications until the task is aborted.
    ///
    /// When a subscription cannot be opened or both streams close, waits
    /// `retry` and pulls again before resubscribing.
    pub fn spawn(self: Arc<Self>, retry: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.subscribe_changes().await {
                    Ok((playlist, terminal)) => self.consume(playlist, terminal).await,
                    Err(e) => warn!("Playlist change subscription failed: {}", e),
                }

                tokio::time::sleep(retry).await;
                let _ = self.refresh().await;
            }
        })
    }

    async fn subscribe_changes(&self) -> Result<(ChangeStream, ChangeStream)> {
        let playlist = self.api.subscribe_playlist_changes(&self.terminal_id).await?;
        let terminal = self.api.subscribe_terminal_changes(&self.terminal_id).await?;
        Ok((playlist, terminal))
    }

    /// Re-pull once per burst of notifications; returns when both streams close
    pub async fn consume(&self, mut playlist: ChangeStream, mut terminal: ChangeStream) {
        loop {
            let notification = tokio::select! {
                Some(n) = playlist.recv() => n,
                Some(n) = terminal.recv() => n,
                else => break,
            };
            debug!(?notification, "Backend change notification");

            while playlist.try_recv().is_ok() || terminal.try_recv().is_ok() {}

            let _ = self.refresh().await;
        }
        debug!("Change streams closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_common::models::{DynamicConfig, MediaKind};

    fn media_row(slot_index: i64, media_id: &str) -> PlaylistSlotContent {
        PlaylistSlotContent {
            slot_index,
            media_id: Some(media_id.to_string()),
            media_name: None,
            media_url: Some(format!("https://cdn.example/{}.png", media_id)),
            media_kind: Some(MediaKind::Image),
            duration_override_seconds: None,
            dynamic_config: None,
        }
    }

    #[test]
    fn test_duplicate_index_first_wins() {
        let snapshot = PlaylistSnapshot::from_wire(
            vec![media_row(3, "first"), media_row(3, "second"), media_row(4, "other")],
            Utc::now(),
        );
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(3).unwrap().content.media_id(), Some("first"));
    }

    #[test]
    fn test_uninterpretable_rows_dropped() {
        let mut broken = media_row(1, "x");
        broken.media_url = None;
        let snapshot = PlaylistSnapshot::from_wire(
            vec![broken, media_row(-2, "neg"), media_row(0, "ok")],
            Utc::now(),
        );
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(0).is_some());
    }

    #[test]
    fn test_downloadable_media_skips_feeds() {
        let mut feed = media_row(12, "feed");
        feed.media_kind = Some(MediaKind::Feed);
        let snapshot = PlaylistSnapshot::from_wire(vec![media_row(0, "a"), feed], Utc::now());

        assert_eq!(
            snapshot.downloadable_media(),
            vec![("a".to_string(), "https://cdn.example/a.png".to_string())]
        );
        assert_eq!(snapshot.referenced_media().len(), 2);
    }

    #[test]
    fn test_feed_row_without_media_id_is_kept() {
        let feed = PlaylistSlotContent {
            slot_index: 12,
            media_id: None,
            media_name: None,
            media_url: None,
            media_kind: Some(MediaKind::Feed),
            duration_override_seconds: None,
            dynamic_config: Some(DynamicConfig {
                url: Some("https://news.example/rss".to_string()),
                zoom: 1.0,
            }),
        };
        let snapshot = PlaylistSnapshot::from_wire(vec![feed, media_row(0, "a")], Utc::now());

        assert_eq!(snapshot.len(), 2);
        assert!(matches!(
            snapshot.get(12).unwrap().content,
            SlotContent::DynamicFeed { media_id: None, .. }
        ));
        assert_eq!(snapshot.referenced_media().len(), 1);
        assert_eq!(snapshot.downloadable_media().len(), 1);
    }
}
