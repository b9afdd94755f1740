//! In-memory backend implementing all three backend traits

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, Notify};
use vitrine_common::models::{PlaybackRecord, PlaylistSlotContent};
use vitrine_kiosk::backend::{
    ChangeStream, ContentApi, PairingApi, PairingStatus, TelemetryApi, TerminalEvent,
};
use vitrine_kiosk::{Error, Result};

#[derive(Default)]
pub struct FakeBackend {
    // Content
    pub playlist: Mutex<Vec<PlaylistSlotContent>>,
    pub playlist_fails: AtomicBool,
    pub playlist_pulls: AtomicUsize,

    // Telemetry
    pub telemetry_fails: AtomicBool,
    pub batches: Mutex<Vec<Vec<PlaybackRecord>>>,
    pub terminal_events: Mutex<Vec<TerminalEvent>>,
    /// When set, a batch submit signals `submit_entered` and waits for `release_submit`
    pub hold_submit: AtomicBool,
    pub submit_entered: Notify,
    pub release_submit: Notify,

    // Pairing
    pub register_fails: AtomicBool,
    pub registered: Mutex<Vec<(String, String)>>,
    pub pairing_status: Mutex<Option<PairingStatus>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_playlist(&self, rows: Vec<PlaylistSlotContent>) {
        *self.playlist.lock().unwrap() = rows;
    }

    pub fn sent_records(&self) -> Vec<PlaybackRecord> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    fn unavailable() -> Error {
        Error::Backend {
            status: 503,
            message: "backend unavailable".to_string(),
        }
    }
}

#[async_trait]
impl ContentApi for FakeBackend {
    async fn assigned_playlist(&self, _terminal_id: &str) -> Result<Vec<PlaylistSlotContent>> {
        self.playlist_pulls.fetch_add(1, Ordering::SeqCst);
        if self.playlist_fails.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.playlist.lock().unwrap().clone())
    }

    async fn subscribe_playlist_changes(&self, _terminal_id: &str) -> Result<ChangeStream> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn subscribe_terminal_changes(&self, _terminal_id: &str) -> Result<ChangeStream> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}

#[async_trait]
impl TelemetryApi for FakeBackend {
    async fn submit_playback_batch(&self, records: &[PlaybackRecord]) -> Result<()> {
        if self.hold_submit.load(Ordering::SeqCst) {
            self.submit_entered.notify_one();
            self.release_submit.notified().await;
        }
        if self.telemetry_fails.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(())
    }

    async fn submit_terminal_event(&self, event: &TerminalEvent) -> Result<()> {
        self.terminal_events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl PairingApi for FakeBackend {
    async fn register_pairing_code(&self, code: &str, hardware_id: &str) -> Result<()> {
        if self.register_fails.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.registered
            .lock()
            .unwrap()
            .push((code.to_string(), hardware_id.to_string()));
        Ok(())
    }

    async fn check_pairing_status(&self, _code: &str) -> Result<PairingStatus> {
        Ok(self
            .pairing_status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(PairingStatus {
                paired: false,
                terminal_id: None,
            }))
    }
}
