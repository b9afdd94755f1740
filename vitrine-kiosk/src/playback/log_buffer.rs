//! Durable proof-of-play queue
//!
//! Records are appended to the `playback_log` table and drained to the
//! backend in batches. A flush deletes exactly the row ids it sent, so
//! records appended while a batch is in flight survive untouched.
//!
//! Records leave the queue only through:
//! - a confirmed batch send
//! - validation rejection at append (logged, never queued)
//! - capacity eviction of the oldest rows (logged)

use crate::backend::TelemetryApi;
use crate::db::playback_log;
use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitrine_common::events::{EventBus, KioskEvent};
use vitrine_common::models::PlaybackRecord;
use vitrine_common::uuid_utils;

pub struct PlaybackLog {
    db: Pool<Sqlite>,
    capacity: usize,
    events: EventBus,
    /// Serializes flushes; appends never take it
    flush_lock: Mutex<()>,
}

impl PlaybackLog {
    pub fn new(db: Pool<Sqlite>, capacity: usize, events: EventBus) -> Self {
        Self {
            db,
            capacity: capacity.max(1),
            events,
            flush_lock: Mutex::new(()),
        }
    }

    /// Queue a record.
    ///
    /// Records whose media or terminal id is not a well-formed UUID are
    /// rejected with [`Error::Validation`] and never stored.
    pub async fn append(&self, record: PlaybackRecord) -> Result<()> {
        if let Err(reason) = validate(&record) {
            warn!(
                media_id = %record.media_id,
                slot = record.slot_index,
                "Rejected playback record: {}",
                reason
            );
            self.events.emit_lossy(KioskEvent::RecordRejected {
                media_id: record.media_id.clone(),
                reason: reason.clone(),
                timestamp: vitrine_common::time::now(),
            });
            return Err(Error::Validation(reason));
        }

        let evicted = playback_log::insert_bounded(&self.db, &record, self.capacity).await?;
        if evicted > 0 {
            warn!(
                evicted,
                capacity = self.capacity,
                "Playback log full; evicted oldest records"
            );
        }

        debug!(
            media_id = %record.media_id,
            slot = record.slot_index,
            status = record.status.as_str(),
            "Queued playback record"
        );
        Ok(())
    }

    /// Send every queued record in one batch.
    ///
    /// On success the sent rows are deleted and their count returned. On
    /// failure nothing is deleted.
    pub async fn flush(&self, telemetry: &dyn TelemetryApi) -> Result<usize> {
        let _guard = self.flush_lock.lock().await;

        let batch = playback_log::fetch_oldest(&self.db, self.capacity).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = batch.iter().map(|q| q.id).collect();
        let records: Vec<PlaybackRecord> = batch.into_iter().map(|q| q.record).collect();

        if let Err(e) = telemetry.submit_playback_batch(&records).await {
            warn!(pending = records.len(), "Playback log flush failed: {}", e);
            self.events.emit_lossy(KioskEvent::LogFlushFailed {
                pending: records.len(),
                reason: e.to_string(),
                timestamp: vitrine_common::time::now(),
            });
            return Err(e);
        }

        playback_log::delete_ids(&self.db, &ids).await?;
        info!(sent = records.len(), "Flushed playback records");
        self.events.emit_lossy(KioskEvent::LogFlushed {
            sent: records.len(),
            timestamp: vitrine_common::time::now(),
        });
        Ok(records.len())
    }

    /// Number of records waiting to be sent
    pub async fn len(&self) -> Result<usize> {
        playback_log::count(&self.db).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Flush on a fixed interval until the task is aborted
    pub fn spawn_flusher(
        self: Arc<Self>,
        telemetry: Arc<dyn TelemetryApi>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Playback log flusher started (every {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                // Failures are already logged and leave the queue intact
                let _ = self.flush(telemetry.as_ref()).await;
            }
        })
    }
}

fn validate(record: &PlaybackRecord) -> std::result::Result<(), String> {
    if !uuid_utils::is_well_formed(&record.media_id) {
        return Err(format!("media id '{}' is not a UUID", record.media_id));
    }
    if !uuid_utils::is_well_formed(&record.terminal_id) {
        return Err(format!("terminal id '{}' is not a UUID", record.terminal_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vitrine_common::db::init_memory_database;
    use vitrine_common::models::{PlaybackStatus, SlotKind};

    fn record(media_id: &str) -> PlaybackRecord {
        PlaybackRecord {
            terminal_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
            media_id: media_id.to_string(),
            media_name: "Ad".to_string(),
            media_url: "https://cdn.example/ad.png".to_string(),
            slot_index: 2,
            slot_type: SlotKind::LocalAd,
            status: PlaybackStatus::Played,
            played_at: Utc::now(),
            cached_locally: false,
            app_version: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_malformed_media_id_rejected() {
        let pool = init_memory_database().await.unwrap();
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let log = PlaybackLog::new(pool, 10, events);

        let result = log.append(record("not-a-uuid")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(log.len().await.unwrap(), 0);
        assert!(matches!(
            rx.try_recv().unwrap(),
            KioskEvent::RecordRejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let pool = init_memory_database().await.unwrap();
        let log = PlaybackLog::new(pool.clone(), 2, EventBus::new(16));

        let ids: Vec<String> = (0..3).map(|_| uuid_utils::generate().to_string()).collect();
        for id in &ids {
            log.append(record(id)).await.unwrap();
        }

        let remaining = playback_log::fetch_oldest(&pool, 10).await.unwrap();
        let remaining: Vec<&str> = remaining.iter().map(|q| q.record.media_id.as_str()).collect();
        assert_eq!(remaining, vec![ids[1].as_str(), ids[2].as_str()]);
    }
}
