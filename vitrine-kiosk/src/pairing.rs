//! Device pairing
//!
//! An unpaired kiosk shows a short code on screen, registers it with the
//! backend together with its hardware id, and polls until an operator
//! claims the code. The assigned terminal id is persisted; the caller then
//! restarts the process so every component starts against that identity.

use crate::backend::PairingApi;
use crate::db::settings::save_terminal_id;
use crate::error::{Error, Result};
use rand::Rng;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vitrine_common::events::{EventBus, KioskEvent};

pub const PAIRING_CODE_LEN: usize = 6;

/// Code alphabet without look-alike characters (0/O, 1/I/L)
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate a fresh pairing code
pub fn generate_pairing_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PAIRING_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingState {
    /// Code generated but not yet accepted by the backend
    Unpaired,
    /// Code registered; waiting for an operator to claim it
    AwaitingConfirmation,
    /// Terminal id received and persisted
    Paired { terminal_id: String },
}

pub struct PairingAgent {
    api: Arc<dyn PairingApi>,
    db: Pool<Sqlite>,
    events: EventBus,
    hardware_id: Uuid,
    poll_interval: Duration,
    /// Session-scoped; a restart generates a new one
    code: String,
    state: PairingState,
}

impl PairingAgent {
    pub fn new(
        api: Arc<dyn PairingApi>,
        db: Pool<Sqlite>,
        events: EventBus,
        hardware_id: Uuid,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            db,
            events,
            hardware_id,
            poll_interval,
            code: generate_pairing_code(),
            state: PairingState::Unpaired,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn state(&self) -> &PairingState {
        &self.state
    }

    /// Advance the handshake by one step.
    ///
    /// Backend errors leave the state unchanged so the next tick retries.
    pub async fn tick(&mut self) -> Result<&PairingState> {
        match self.state {
            PairingState::Unpaired => {
                self.api
                    .register_pairing_code(&self.code, &self.hardware_id.to_string())
                    .await?;
                info!(code = %self.code, "Pairing code registered; enter it in the console");
                self.events.emit_lossy(KioskEvent::PairingCodeIssued {
                    code: self.code.clone(),
                    timestamp: vitrine_common::time::now(),
                });
                self.state = PairingState::AwaitingConfirmation;
            }
            PairingState::AwaitingConfirmation => {
                let status = self.api.check_pairing_status(&self.code).await?;
                if status.paired {
                    let terminal_id = status.terminal_id.ok_or_else(|| {
                        Error::Pairing("Backend confirmed pairing without a terminal id".to_string())
                    })?;
                    save_terminal_id(&self.db, &terminal_id).await?;
                    info!(terminal_id = %terminal_id, "Terminal paired");
                    self.events.emit_lossy(KioskEvent::Paired {
                        terminal_id: terminal_id.clone(),
                        timestamp: vitrine_common::time::now(),
                    });
                    self.state = PairingState::Paired { terminal_id };
                } else {
                    debug!(code = %self.code, "Pairing not confirmed yet");
                }
            }
            PairingState::Paired { .. } => {}
        }
        Ok(&self.state)
    }

    /// Poll until paired; returns the persisted terminal id
    pub async fn run(mut self) -> Result<String> {
        info!(code = %self.code, hardware_id = %self.hardware_id, "Starting pairing");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(PairingState::Paired { terminal_id }) => return Ok(terminal_id.clone()),
                Ok(_) => {}
                Err(e) => warn!("Pairing step failed, retrying: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_shape() {
        for _ in 0..100 {
            let code = generate_pairing_code();
            assert_eq!(code.len(), PAIRING_CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }
}
