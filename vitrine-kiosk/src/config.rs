//! Runtime settings for the kiosk
//!
//! Second configuration tier: values live in the `settings` table. Missing
//! or NULL values are initialized with the built-in defaults below and
//! written back so the database always shows the effective configuration.
//!
//! Bootstrap values (paths, backend URL, logging) come from
//! `vitrine_common::config`.

use crate::db::settings::{get_setting, set_setting};
use crate::error::Result;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Runtime settings loaded from database
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    // === Playback log ===
    /// Seconds between background flushes
    pub flush_interval_secs: u64,
    /// Maximum queued records before oldest-first eviction
    pub log_capacity: usize,

    // === Scheduler ===
    /// Hard upper bound on a single video presentation
    pub video_ceiling_secs: u64,
    /// Slack added to a video's reported length before force-advancing
    pub video_end_grace_secs: u64,
    /// Pause after a full cycle with nothing presentable
    pub idle_backoff_secs: u64,
    /// Append a `status=error` record when content fails from both sources
    pub report_failed_presentations: bool,

    // === News feed ===
    pub feed_ttl_secs: u64,
    pub feed_rotation_secs: u64,
    pub feed_refresh_secs: u64,

    // === Sync / pairing ===
    /// Revision poll period of the HTTP change subscription
    pub sync_poll_secs: u64,
    pub pairing_poll_secs: u64,

    // === Media cache ===
    pub download_attempts: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            flush_interval_secs: 300,
            log_capacity: 1000,
            video_ceiling_secs: 300,
            video_end_grace_secs: 2,
            idle_backoff_secs: 5,
            report_failed_presentations: false,
            feed_ttl_secs: 600,
            feed_rotation_secs: 3,
            feed_refresh_secs: 600,
            sync_poll_secs: 15,
            pairing_poll_secs: 3,
            download_attempts: 3,
        }
    }
}

impl RuntimeSettings {
    /// Load runtime settings from database
    ///
    /// For each setting:
    /// 1. Try to read from database
    /// 2. If NULL or missing, use built-in default
    /// 3. Write default back to database for consistency
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            flush_interval_secs: load_or_init(pool, "flush_interval_secs", defaults.flush_interval_secs)
                .await?
                .max(1),
            log_capacity: load_or_init(pool, "log_capacity", defaults.log_capacity)
                .await?
                .max(1),
            video_ceiling_secs: load_or_init(pool, "video_ceiling_secs", defaults.video_ceiling_secs)
                .await?
                .max(1),
            video_end_grace_secs: load_or_init(pool, "video_end_grace_secs", defaults.video_end_grace_secs).await?,
            idle_backoff_secs: load_or_init(pool, "idle_backoff_secs", defaults.idle_backoff_secs)
                .await?
                .max(1),
            report_failed_presentations: load_or_init(
                pool,
                "report_failed_presentations",
                defaults.report_failed_presentations,
            )
            .await?,
            feed_ttl_secs: load_or_init(pool, "feed_ttl_secs", defaults.feed_ttl_secs).await?,
            feed_rotation_secs: load_or_init(pool, "feed_rotation_secs", defaults.feed_rotation_secs)
                .await?
                .max(1),
            feed_refresh_secs: load_or_init(pool, "feed_refresh_secs", defaults.feed_refresh_secs)
                .await?
                .max(1),
            sync_poll_secs: load_or_init(pool, "sync_poll_secs", defaults.sync_poll_secs)
                .await?
                .max(1),
            pairing_poll_secs: load_or_init(pool, "pairing_poll_secs", defaults.pairing_poll_secs)
                .await?
                .max(1),
            download_attempts: load_or_init(pool, "download_attempts", defaults.download_attempts)
                .await?
                .max(1),
        };

        Ok(settings)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn video_ceiling(&self) -> Duration {
        Duration::from_secs(self.video_ceiling_secs)
    }

    pub fn video_end_grace(&self) -> Duration {
        Duration::from_secs(self.video_end_grace_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_secs)
    }

    pub fn feed_rotation(&self) -> Duration {
        Duration::from_secs(self.feed_rotation_secs)
    }

    pub fn feed_refresh(&self) -> Duration {
        Duration::from_secs(self.feed_refresh_secs)
    }

    pub fn sync_poll(&self) -> Duration {
        Duration::from_secs(self.sync_poll_secs)
    }

    pub fn pairing_poll(&self) -> Duration {
        Duration::from_secs(self.pairing_poll_secs)
    }
}

async fn load_or_init<T>(pool: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: FromStr + ToString,
{
    match get_setting::<T>(pool, key).await? {
        Some(value) => Ok(value),
        None => {
            info!("Setting '{}' not found in database, using default: {}", key, default.to_string());
            set_setting(pool, key, default.to_string()).await?;
            Ok(default)
        }
    }
}
