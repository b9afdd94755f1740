//! Scheduler wired to fakes, plus row and record builders

use super::fake_renderer::{FakeRenderer, ImmediateClock};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use vitrine_common::db::init_memory_database;
use vitrine_common::events::EventBus;
use vitrine_common::models::{
    DynamicConfig, MediaKind, PlaybackRecord, PlaybackStatus, PlaylistSlotContent, SlotKind,
};
use vitrine_kiosk::cache::{DownloadRequest, MediaCache};
use vitrine_kiosk::db::playback_log;
use vitrine_kiosk::feed::{FeedCache, FeedError, FeedFetcher, NewsFeedProvider};
use vitrine_kiosk::playback::{
    PlaybackLog, PlaybackScheduler, SchedulerDeps, SchedulerSettings, SlotCycleModel, StepOutcome,
};
use vitrine_kiosk::playlist::PlaylistSnapshot;
use vitrine_kiosk::SharedState;

pub const TERMINAL_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

const FEED: &str = "<rss><channel><item><title>Local news</title></item></channel></rss>";

struct StaticFeed;

#[async_trait]
impl FeedFetcher for StaticFeed {
    async fn fetch(&self, _url: &str) -> Result<String, FeedError> {
        Ok(FEED.to_string())
    }
}

fn row(slot_index: i64, media_id: &str, kind: MediaKind, ext: &str) -> PlaylistSlotContent {
    PlaylistSlotContent {
        slot_index,
        media_id: Some(media_id.to_string()),
        media_name: Some(format!("media {}", slot_index)),
        media_url: Some(format!("https://cdn.example/{}.{}", media_id, ext)),
        media_kind: Some(kind),
        duration_override_seconds: None,
        dynamic_config: None,
    }
}

pub fn image_row(slot_index: i64, media_id: &str) -> PlaylistSlotContent {
    row(slot_index, media_id, MediaKind::Image, "png")
}

pub fn video_row(slot_index: i64, media_id: &str) -> PlaylistSlotContent {
    row(slot_index, media_id, MediaKind::Video, "mp4")
}

/// Feed row the backend sent without a media id
pub fn anonymous_feed_row(slot_index: i64) -> PlaylistSlotContent {
    PlaylistSlotContent {
        media_id: None,
        media_name: None,
        ..feed_row(slot_index, "unused")
    }
}

pub fn feed_row(slot_index: i64, media_id: &str) -> PlaylistSlotContent {
    PlaylistSlotContent {
        slot_index,
        media_id: Some(media_id.to_string()),
        media_name: Some("News".to_string()),
        media_url: None,
        media_kind: Some(MediaKind::Feed),
        duration_override_seconds: None,
        dynamic_config: Some(DynamicConfig {
            url: Some("https://news.example/rss".to_string()),
            zoom: 1.0,
        }),
    }
}

/// A valid played record for `media_id`
pub fn record_for(media_id: &str) -> PlaybackRecord {
    PlaybackRecord {
        terminal_id: TERMINAL_ID.to_string(),
        media_id: media_id.to_string(),
        media_name: "Ad".to_string(),
        media_url: format!("https://cdn.example/{}.png", media_id),
        slot_index: 3,
        slot_type: SlotKind::LocalAd,
        status: PlaybackStatus::Played,
        played_at: Utc::now(),
        cached_locally: false,
        app_version: "test".to_string(),
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct Harness {
    pub scheduler: PlaybackScheduler,
    pub renderer: Arc<FakeRenderer>,
    pub clock: Arc<ImmediateClock>,
    pub cache: Arc<MediaCache>,
    pub downloads: mpsc::Receiver<DownloadRequest>,
    pub log: Arc<PlaybackLog>,
    pub db: SqlitePool,
    pub events: EventBus,
    pub state: Arc<SharedState>,
    playlist: PlaylistHandle,
    cache_dir: TempDir,
}

/// Publishes playlist snapshots to a running harness
#[derive(Clone)]
pub struct PlaylistHandle(Arc<watch::Sender<Arc<PlaylistSnapshot>>>);

impl PlaylistHandle {
    pub fn set(&self, rows: Vec<PlaylistSlotContent>) {
        self.0
            .send_replace(Arc::new(PlaylistSnapshot::from_wire(rows, Utc::now())));
    }
}

impl Harness {
    pub async fn new(rows: Vec<PlaylistSlotContent>) -> Self {
        Self::with_settings(rows, SchedulerSettings::default()).await
    }

    pub async fn with_settings(rows: Vec<PlaylistSlotContent>, settings: SchedulerSettings) -> Self {
        Self::with_feed_fetcher(rows, settings, Arc::new(StaticFeed)).await
    }

    pub async fn with_feed_fetcher(
        rows: Vec<PlaylistSlotContent>,
        settings: SchedulerSettings,
        fetcher: Arc<dyn FeedFetcher>,
    ) -> Self {
        let db = init_memory_database().await.unwrap();
        let events = EventBus::new(256);
        let cache_dir = TempDir::new().unwrap();

        let (cache, downloads) = MediaCache::new(cache_dir.path(), events.clone());
        let cache = Arc::new(cache);
        cache.rescan().await.unwrap();

        let log = Arc::new(PlaybackLog::new(db.clone(), 1000, events.clone()));
        let feeds = Arc::new(NewsFeedProvider::new(
            fetcher,
            FeedCache::new(),
            Duration::from_secs(600),
            None,
        ));
        let renderer = Arc::new(FakeRenderer::new());
        let clock = Arc::new(ImmediateClock::new());
        let state = Arc::new(SharedState::new(TERMINAL_ID));

        let (playlist, playlist_rx) =
            watch::channel(Arc::new(PlaylistSnapshot::from_wire(rows, Utc::now())));

        let scheduler = PlaybackScheduler::new(
            SchedulerDeps {
                cycle: SlotCycleModel::standard(),
                playlist: playlist_rx,
                cache: cache.clone(),
                log: log.clone(),
                feeds,
                renderer: renderer.clone(),
                clock: clock.clone(),
                events: events.clone(),
                state: state.clone(),
            },
            settings,
            TERMINAL_ID,
            "test",
        );

        Self {
            scheduler,
            renderer,
            clock,
            cache,
            downloads,
            log,
            db,
            events,
            state,
            playlist: PlaylistHandle(Arc::new(playlist)),
            cache_dir,
        }
    }

    /// Replace the playlist snapshot the scheduler reads
    pub fn set_playlist(&self, rows: Vec<PlaylistSlotContent>) {
        self.playlist.set(rows);
    }

    /// Handle for replacing the playlist from inside a fake
    pub fn playlist_handle(&self) -> PlaylistHandle {
        self.playlist.clone()
    }

    /// Put a file for `media_id` into the cache directory and reindex
    pub async fn seed_cache(&self, media_id: &str, ext: &str) {
        std::fs::write(self.cache_dir.path().join(format!("{}.{}", media_id, ext)), b"data").unwrap();
        self.cache.rescan().await.unwrap();
    }

    pub async fn steps(&mut self, n: usize) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(n);
        for _ in 0..n {
            outcomes.push(self.scheduler.step().await);
        }
        outcomes
    }

    /// Records queued in the playback log, oldest first
    pub async fn records(&self) -> Vec<PlaybackRecord> {
        playback_log::fetch_oldest(&self.db, 10_000)
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.record)
            .collect()
    }
}
