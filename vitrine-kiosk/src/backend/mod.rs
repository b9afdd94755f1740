//! Backend collaborator contracts
//!
//! The kiosk only depends on these traits; [`http::HttpBackend`] is the
//! production implementation and tests substitute in-memory fakes.

pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use vitrine_common::events::EventSeverity;
use vitrine_common::models::{PlaybackRecord, PlaylistSlotContent};

pub use http::HttpBackend;

/// Something changed on the backend; the receiver should re-pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeNotification {
    /// Slot assignments of the terminal's playlist changed
    Playlist,
    /// The terminal row itself changed (e.g. a different playlist assigned)
    Terminal,
}

/// Stream of change notifications; closes when the subscription ends
pub type ChangeStream = mpsc::Receiver<ChangeNotification>;

/// Playlist content source
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Full slot list of the playlist assigned to `terminal_id`
    async fn assigned_playlist(&self, terminal_id: &str) -> Result<Vec<PlaylistSlotContent>>;

    async fn subscribe_playlist_changes(&self, terminal_id: &str) -> Result<ChangeStream>;

    async fn subscribe_terminal_changes(&self, terminal_id: &str) -> Result<ChangeStream>;
}

/// Diagnostic event recorded against a terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalEvent {
    pub terminal_id: String,
    pub level: EventSeverity,
    pub message: String,
    pub details: serde_json::Value,
}

/// Proof-of-play and diagnostics sink
#[async_trait]
pub trait TelemetryApi: Send + Sync {
    /// Send a batch; `Ok` means the backend stored every record
    async fn submit_playback_batch(&self, records: &[PlaybackRecord]) -> Result<()>;

    async fn submit_terminal_event(&self, event: &TerminalEvent) -> Result<()>;
}

/// Answer to a pairing status poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingStatus {
    pub paired: bool,
    #[serde(default)]
    pub terminal_id: Option<String>,
}

/// Device pairing handshake
#[async_trait]
pub trait PairingApi: Send + Sync {
    async fn register_pairing_code(&self, code: &str, hardware_id: &str) -> Result<()>;

    async fn check_pairing_status(&self, code: &str) -> Result<PairingStatus>;
}
