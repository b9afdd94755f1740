//! Settings database access
//!
//! Read/write settings from the settings table (key-value store), including
//! the persisted terminal identity.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;
use vitrine_common::uuid_utils;

const TERMINAL_ID_KEY: &str = "terminal_id";
const HARDWARE_ID_KEY: &str = "hardware_id";

/// Load the backend-assigned terminal id, if paired
pub async fn load_terminal_id(db: &Pool<Sqlite>) -> Result<Option<String>> {
    let value = get_setting::<String>(db, TERMINAL_ID_KEY).await?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Persist the terminal id received at pairing
pub async fn save_terminal_id(db: &Pool<Sqlite>, terminal_id: &str) -> Result<()> {
    if !uuid_utils::is_well_formed(terminal_id) {
        return Err(Error::Pairing(format!(
            "Backend assigned malformed terminal id '{}'",
            terminal_id
        )));
    }
    set_setting(db, TERMINAL_ID_KEY, terminal_id).await
}

/// Forget the terminal identity so the next start pairs again
pub async fn clear_terminal_id(db: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(TERMINAL_ID_KEY)
        .execute(db)
        .await?;
    Ok(())
}

/// Load the device hardware id, generating and persisting one on first run
pub async fn ensure_hardware_id(db: &Pool<Sqlite>) -> Result<Uuid> {
    match get_setting::<String>(db, HARDWARE_ID_KEY).await? {
        Some(id_str) => Uuid::parse_str(&id_str)
            .map_err(|e| Error::Config(format!("Invalid UUID in hardware_id: {}", e))),
        None => {
            let id = uuid_utils::generate();
            set_setting(db, HARDWARE_ID_KEY, id).await?;
            info!(hardware_id = %id, "Generated hardware id");
            Ok(id)
        }
    }
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database or its value is NULL.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_common::db::init_memory_database;

    #[tokio::test]
    async fn test_get_missing_setting_is_none() {
        let pool = init_memory_database().await.unwrap();
        let value = get_setting::<u64>(&pool, "nope").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_overwrites() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, "flush_interval_secs", 300).await.unwrap();
        set_setting(&pool, "flush_interval_secs", 60).await.unwrap();
        assert_eq!(get_setting::<u64>(&pool, "flush_interval_secs").await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, "flush_interval_secs", "soon").await.unwrap();
        let result = get_setting::<u64>(&pool, "flush_interval_secs").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_terminal_id_lifecycle() {
        let pool = init_memory_database().await.unwrap();
        assert!(load_terminal_id(&pool).await.unwrap().is_none());

        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        save_terminal_id(&pool, id).await.unwrap();
        assert_eq!(load_terminal_id(&pool).await.unwrap().as_deref(), Some(id));

        clear_terminal_id(&pool).await.unwrap();
        assert!(load_terminal_id(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_terminal_id_not_saved() {
        let pool = init_memory_database().await.unwrap();
        assert!(save_terminal_id(&pool, "terminal-7").await.is_err());
        assert!(load_terminal_id(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hardware_id_is_stable() {
        let pool = init_memory_database().await.unwrap();
        let first = ensure_hardware_id(&pool).await.unwrap();
        let second = ensure_hardware_id(&pool).await.unwrap();
        assert_eq!(first, second);
    }
}
