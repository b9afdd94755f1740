//! Shared kiosk state
//!
//! Written by the scheduler, read by the status endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use vitrine_common::models::{MediaKind, SlotKind};

/// What is on screen right now
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentPresentation {
    pub slot_index: usize,
    pub slot_type: SlotKind,
    pub media_id: String,
    pub name: String,
    pub kind: MediaKind,
    pub cached: bool,
    pub started_at: DateTime<Utc>,
}

/// Shared state accessible by all components
///
/// Uses RwLock for concurrent read access with rare writes
pub struct SharedState {
    terminal_id: String,

    /// Current presentation (None while idle or before the first slot)
    current: RwLock<Option<CurrentPresentation>>,

    /// Size of the session failed set
    failed_count: AtomicUsize,

    /// Idle placeholder is showing
    idle: AtomicBool,

    /// Total presentations started this session
    presentations_total: AtomicUsize,
}

impl SharedState {
    pub fn new(terminal_id: impl Into<String>) -> Self {
        Self {
            terminal_id: terminal_id.into(),
            current: RwLock::new(None),
            failed_count: AtomicUsize::new(0),
            idle: AtomicBool::new(false),
            presentations_total: AtomicUsize::new(0),
        }
    }

    pub fn terminal_id(&self) -> &str {
        &self.terminal_id
    }

    pub async fn current_presentation(&self) -> Option<CurrentPresentation> {
        self.current.read().await.clone()
    }

    /// Record a started presentation; clears the idle flag
    pub async fn presentation_started(&self, presentation: CurrentPresentation) {
        *self.current.write().await = Some(presentation);
        self.idle.store(false, Ordering::Relaxed);
        self.presentations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn set_idle(&self) {
        *self.current.write().await = None;
        self.idle.store(true, Ordering::Relaxed);
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Relaxed)
    }

    pub fn set_failed_count(&self, count: usize) {
        self.failed_count.store(count, Ordering::Relaxed);
    }

    pub fn failed_count(&self) -> usize {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn presentations_total(&self) -> usize {
        self.presentations_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presentation() -> CurrentPresentation {
        CurrentPresentation {
            slot_index: 4,
            slot_type: SlotKind::LocalAd,
            media_id: "m".to_string(),
            name: "Ad".to_string(),
            kind: MediaKind::Image,
            cached: true,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_presentation_clears_idle() {
        let state = SharedState::new("t");
        state.set_idle().await;
        assert!(state.is_idle());
        assert!(state.current_presentation().await.is_none());

        state.presentation_started(presentation()).await;
        assert!(!state.is_idle());
        assert_eq!(state.current_presentation().await.unwrap().slot_index, 4);
        assert_eq!(state.presentations_total(), 1);
    }
}
