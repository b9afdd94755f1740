//! Event types for the kiosk event system
//!
//! Provides the shared event definitions and the EventBus used to fan out
//! notifications from the playback timeline and background tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kiosk event types
///
/// Events are broadcast via EventBus and can be serialized for the backend
/// terminal event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KioskEvent {
    /// A slot's content started presenting
    PresentationStarted {
        slot_index: usize,
        media_id: String,
        /// Whether the content was served from the local cache
        cached: bool,
        timestamp: DateTime<Utc>,
    },

    /// Content could not be presented from either cache or remote source.
    ///
    /// The media is skipped for the rest of the session.
    PresentationFailed {
        slot_index: usize,
        media_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A video never signalled its end and was force-advanced
    PresentationTimedOut {
        slot_index: usize,
        media_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A slot was passed over because its media failed earlier this session
    SlotSkipped {
        slot_index: usize,
        media_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A full cycle passed with nothing presentable; placeholder shown
    IdleEntered { timestamp: DateTime<Utc> },

    /// A new playlist snapshot replaced the previous one
    PlaylistUpdated {
        slot_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Playlist pull failed; last known-good snapshot retained
    PlaylistPullFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A media file finished downloading and is now served locally
    MediaCached {
        media_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Background download gave up after its retry budget
    MediaDownloadFailed {
        media_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A playback record failed validation and was not queued
    RecordRejected {
        media_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A batch of playback records was accepted by the backend
    LogFlushed {
        sent: usize,
        timestamp: DateTime<Utc>,
    },

    /// Batch send failed; records stay queued for the next tick
    LogFlushFailed {
        pending: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A pairing code is displayed and registered with the backend
    PairingCodeIssued {
        code: String,
        timestamp: DateTime<Utc>,
    },

    /// The backend confirmed pairing
    Paired {
        terminal_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// How significant an event is for remote diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Error => "error",
        }
    }
}

impl KioskEvent {
    /// Severity used when forwarding the event to the backend
    pub fn severity(&self) -> EventSeverity {
        match self {
            KioskEvent::PresentationFailed { .. } | KioskEvent::MediaDownloadFailed { .. } => {
                EventSeverity::Error
            }
            KioskEvent::PresentationTimedOut { .. }
            | KioskEvent::IdleEntered { .. }
            | KioskEvent::PlaylistPullFailed { .. }
            | KioskEvent::RecordRejected { .. }
            | KioskEvent::LogFlushFailed { .. } => EventSeverity::Warning,
            KioskEvent::PresentationStarted { .. }
            | KioskEvent::SlotSkipped { .. }
            | KioskEvent::PlaylistUpdated { .. }
            | KioskEvent::MediaCached { .. }
            | KioskEvent::LogFlushed { .. }
            | KioskEvent::PairingCodeIssued { .. }
            | KioskEvent::Paired { .. } => EventSeverity::Info,
        }
    }

    /// Short human-readable description
    pub fn message(&self) -> String {
        match self {
            KioskEvent::PresentationStarted { slot_index, media_id, .. } => {
                format!("Slot {} presenting {}", slot_index, media_id)
            }
            KioskEvent::PresentationFailed { slot_index, media_id, reason, .. } => {
                format!("Slot {} media {} failed: {}", slot_index, media_id, reason)
            }
            KioskEvent::PresentationTimedOut { slot_index, media_id, .. } => {
                format!("Slot {} media {} hit the video safety ceiling", slot_index, media_id)
            }
            KioskEvent::SlotSkipped { slot_index, media_id, .. } => {
                format!("Slot {} skipped failed media {}", slot_index, media_id)
            }
            KioskEvent::IdleEntered { .. } => "No presentable content; showing idle screen".to_string(),
            KioskEvent::PlaylistUpdated { slot_count, .. } => {
                format!("Playlist updated ({} slots)", slot_count)
            }
            KioskEvent::PlaylistPullFailed { reason, .. } => {
                format!("Playlist pull failed: {}", reason)
            }
            KioskEvent::MediaCached { media_id, .. } => format!("Media {} cached", media_id),
            KioskEvent::MediaDownloadFailed { media_id, reason, .. } => {
                format!("Media {} download failed: {}", media_id, reason)
            }
            KioskEvent::RecordRejected { media_id, reason, .. } => {
                format!("Playback record for '{}' rejected: {}", media_id, reason)
            }
            KioskEvent::LogFlushed { sent, .. } => format!("Flushed {} playback records", sent),
            KioskEvent::LogFlushFailed { pending, reason, .. } => {
                format!("Flush of {} playback records failed: {}", pending, reason)
            }
            KioskEvent::PairingCodeIssued { code, .. } => format!("Pairing code {} issued", code),
            KioskEvent::Paired { terminal_id, .. } => format!("Paired as terminal {}", terminal_id),
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the playback loop)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// ```
/// use vitrine_common::events::{EventBus, KioskEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(KioskEvent::IdleEntered { timestamp: chrono::Utc::now() });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KioskEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: KioskEvent,
    ) -> Result<usize, broadcast::error::SendError<KioskEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: KioskEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        let result = bus.emit(KioskEvent::IdleEntered {
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        // Lossy variant must not panic
        bus.emit_lossy(KioskEvent::IdleEntered {
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(KioskEvent::LogFlushed {
            sent: 3,
            timestamp: Utc::now(),
        })
        .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                KioskEvent::LogFlushed { sent, .. } => assert_eq!(sent, 3),
                other => panic!("Unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_severity_classification() {
        let failed = KioskEvent::PresentationFailed {
            slot_index: 2,
            media_id: "m".to_string(),
            reason: "decode".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert!(failed.message().contains("decode"));

        let flushed = KioskEvent::LogFlushed {
            sent: 1,
            timestamp: Utc::now(),
        };
        assert_eq!(flushed.severity(), EventSeverity::Info);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = KioskEvent::Paired {
            terminal_id: "t-1".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Paired");
        assert_eq!(json["terminal_id"], "t-1");
    }
}
