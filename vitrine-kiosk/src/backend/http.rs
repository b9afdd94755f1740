//! HTTP implementation of the backend contracts
//!
//! Endpoints (relative to the configured base URL):
//! - `GET  /terminals/{id}/playlist`   slot list of the assigned playlist
//! - `GET  /terminals/{id}/revisions`  `{ "playlist": .., "terminal": .. }`
//! - `POST /playback-logs`             `{ "records": [..] }`
//! - `POST /terminal-events`
//! - `POST /pairing-codes`             `{ "code": .., "hardware_id": .. }`
//! - `GET  /pairing-codes/{code}`
//!
//! Change subscriptions are realised by polling the revisions endpoint and
//! emitting a notification whenever the watched revision differs from the
//! previous poll.

use super::{
    ChangeNotification, ChangeStream, ContentApi, PairingApi, PairingStatus, TelemetryApi,
    TerminalEvent,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use vitrine_common::models::{PlaybackRecord, PlaylistSlotContent};

const USER_AGENT: &str = concat!("vitrine-kiosk/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Default, Deserialize)]
struct Revisions {
    #[serde(default)]
    playlist: Option<serde_json::Value>,
    #[serde(default)]
    terminal: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct PlaybackBatch<'a> {
    records: &'a [PlaybackRecord],
}

#[derive(Serialize)]
struct PairingRegistration<'a> {
    code: &'a str,
    hardware_id: &'a str,
}

/// Backend API client over HTTP
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: Option<String>, poll_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.authorize(self.client.get(self.url(path))).send().await?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Payload(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn fetch_revisions(&self, terminal_id: &str) -> Result<Revisions> {
        self.get_json(&format!("terminals/{}/revisions", terminal_id)).await
    }

    /// Spawn a poll loop that reports changes of one revision field.
    ///
    /// The first successful poll sets the baseline and emits nothing. The
    /// task ends when the receiver is dropped.
    fn watch_revision(&self, terminal_id: &str, kind: ChangeNotification) -> ChangeStream {
        let (tx, rx) = mpsc::channel(8);
        let backend = self.clone();
        let terminal_id = terminal_id.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(backend.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_seen: Option<Option<serde_json::Value>> = None;

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                let revisions = match backend.fetch_revisions(&terminal_id).await {
                    Ok(revisions) => revisions,
                    Err(e) => {
                        debug!(?kind, "Revision poll failed: {}", e);
                        continue;
                    }
                };

                let current = match kind {
                    ChangeNotification::Playlist => revisions.playlist,
                    ChangeNotification::Terminal => revisions.terminal,
                };

                match &last_seen {
                    Some(previous) if *previous == current => {}
                    Some(_) => {
                        debug!(?kind, "Backend revision changed");
                        if tx.send(kind).await.is_err() {
                            break;
                        }
                    }
                    None => {}
                }
                last_seen = Some(current);
            }

            debug!(?kind, "Revision watch stopped");
        });

        rx
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Backend {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ContentApi for HttpBackend {
    async fn assigned_playlist(&self, terminal_id: &str) -> Result<Vec<PlaylistSlotContent>> {
        self.get_json(&format!("terminals/{}/playlist", terminal_id)).await
    }

    async fn subscribe_playlist_changes(&self, terminal_id: &str) -> Result<ChangeStream> {
        info!("Subscribing to playlist changes (poll every {:?})", self.poll_interval);
        Ok(self.watch_revision(terminal_id, ChangeNotification::Playlist))
    }

    async fn subscribe_terminal_changes(&self, terminal_id: &str) -> Result<ChangeStream> {
        Ok(self.watch_revision(terminal_id, ChangeNotification::Terminal))
    }
}

#[async_trait]
impl TelemetryApi for HttpBackend {
    async fn submit_playback_batch(&self, records: &[PlaybackRecord]) -> Result<()> {
        self.post_json("playback-logs", &PlaybackBatch { records }).await
    }

    async fn submit_terminal_event(&self, event: &TerminalEvent) -> Result<()> {
        self.post_json("terminal-events", event).await
    }
}

#[async_trait]
impl PairingApi for HttpBackend {
    async fn register_pairing_code(&self, code: &str, hardware_id: &str) -> Result<()> {
        self.post_json("pairing-codes", &PairingRegistration { code, hardware_id })
            .await
    }

    async fn check_pairing_status(&self, code: &str) -> Result<PairingStatus> {
        self.get_json(&format!("pairing-codes/{}", code)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let backend =
            HttpBackend::new("https://backend.example/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            backend.url("/terminals/t/playlist"),
            "https://backend.example/api/terminals/t/playlist"
        );
        assert_eq!(
            backend.url("playback-logs"),
            "https://backend.example/api/playback-logs"
        );
    }

    #[test]
    fn test_revisions_tolerate_missing_fields() {
        let revisions: Revisions = serde_json::from_str(r#"{"playlist": 7}"#).unwrap();
        assert_eq!(revisions.playlist, Some(serde_json::json!(7)));
        assert!(revisions.terminal.is_none());
    }

    #[test]
    fn test_batch_body_shape() {
        let body = serde_json::to_value(PlaybackBatch { records: &[] }).unwrap();
        assert_eq!(body, serde_json::json!({ "records": [] }));
    }
}
