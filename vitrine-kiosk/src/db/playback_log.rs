//! Playback log queue database access
//!
//! Rows are identified by their AUTOINCREMENT id, which is strictly
//! increasing in append order.

use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite};
use vitrine_common::models::{PlaybackRecord, PlaybackStatus, SlotKind};

/// Ids per DELETE statement, below SQLite's bound parameter limit
const DELETE_CHUNK: usize = 500;

/// A queued record with its row id
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRecord {
    pub id: i64,
    pub record: PlaybackRecord,
}

type RecordRow = (
    i64,
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    DateTime<Utc>,
    bool,
    String,
);

/// Insert a record, evicting the oldest rows beyond `capacity`.
///
/// Returns the number of evicted rows.
pub async fn insert_bounded(
    db: &Pool<Sqlite>,
    record: &PlaybackRecord,
    capacity: usize,
) -> Result<u64> {
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO playback_log (
            terminal_id, media_id, media_name, media_url, slot_index, slot_type,
            status, played_at, cached_locally, app_version
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.terminal_id)
    .bind(&record.media_id)
    .bind(&record.media_name)
    .bind(&record.media_url)
    .bind(i64::from(record.slot_index))
    .bind(record.slot_type.as_str())
    .bind(record.status.as_str())
    .bind(record.played_at)
    .bind(record.cached_locally)
    .bind(&record.app_version)
    .execute(&mut *tx)
    .await?;

    let evicted = sqlx::query(
        r#"
        DELETE FROM playback_log
        WHERE id NOT IN (SELECT id FROM playback_log ORDER BY id DESC LIMIT ?)
        "#,
    )
    .bind(capacity as i64)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok(evicted)
}

/// Oldest-first page of queued records
pub async fn fetch_oldest(db: &Pool<Sqlite>, limit: usize) -> Result<Vec<QueuedRecord>> {
    let rows: Vec<RecordRow> = sqlx::query_as(
        r#"
        SELECT id, terminal_id, media_id, media_name, media_url, slot_index, slot_type,
               status, played_at, cached_locally, app_version
        FROM playback_log
        ORDER BY id ASC
        LIMIT ?
        "#,
    )
    .bind(limit as i64)
    .fetch_all(db)
    .await?;

    rows.into_iter().map(row_to_record).collect()
}

/// Delete exactly the given row ids. Missing ids are ignored.
pub async fn delete_ids(db: &Pool<Sqlite>, ids: &[i64]) -> Result<u64> {
    let mut deleted = 0;
    for chunk in ids.chunks(DELETE_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM playback_log WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        deleted += builder.build().execute(db).await?.rows_affected();
    }
    Ok(deleted)
}

/// Number of queued records
pub async fn count(db: &Pool<Sqlite>) -> Result<usize> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM playback_log")
        .fetch_one(db)
        .await?;
    Ok(count.max(0) as usize)
}

fn row_to_record(row: RecordRow) -> Result<QueuedRecord> {
    let (
        id,
        terminal_id,
        media_id,
        media_name,
        media_url,
        slot_index,
        slot_type,
        status,
        played_at,
        cached_locally,
        app_version,
    ) = row;

    Ok(QueuedRecord {
        id,
        record: PlaybackRecord {
            terminal_id,
            media_id,
            media_name,
            media_url,
            slot_index: slot_index.clamp(0, i64::from(u32::MAX)) as u32,
            slot_type: slot_type.parse::<SlotKind>()?,
            status: status.parse::<PlaybackStatus>()?,
            played_at,
            cached_locally,
            app_version,
        },
    })
}
