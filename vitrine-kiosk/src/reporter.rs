//! Terminal event reporter
//!
//! Forwards warning and error events from the event bus to the backend's
//! terminal event log. Best effort: delivery failures are logged at debug
//! and dropped so reporting can never back up into playback.

use crate::backend::{TelemetryApi, TerminalEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vitrine_common::events::{EventBus, EventSeverity, KioskEvent};

/// Backend form of a kiosk event, or None when it is not worth reporting
pub fn to_terminal_event(terminal_id: &str, event: &KioskEvent) -> Option<TerminalEvent> {
    let level = event.severity();
    if level < EventSeverity::Warning {
        return None;
    }

    Some(TerminalEvent {
        terminal_id: terminal_id.to_string(),
        level,
        message: event.message(),
        details: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
    })
}

pub fn spawn_reporter(
    events: &EventBus,
    telemetry: Arc<dyn TelemetryApi>,
    terminal_id: String,
) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event reporter lagged; events not reported");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(report) = to_terminal_event(&terminal_id, &event) else {
                continue;
            };
            if let Err(e) = telemetry.submit_terminal_event(&report).await {
                debug!("Terminal event not delivered: {}", e);
            }
        }
    })
}
