//! # Vitrine Kiosk Library (vitrine-kiosk)
//!
//! Device-resident playback engine for the Vitrine signage platform.
//!
//! **Purpose:** Cycle through a fixed-shape playlist forever, keep playing
//! through network and per-item failures, and report every exhibited item
//! to the backend exactly once.
//!
//! **Architecture:** A single cooperative playback timeline
//! ([`playback::PlaybackScheduler`]) reading an immutable playlist snapshot,
//! with independent background tasks for playlist sync, media downloads,
//! proof-of-play flushing, news refresh, and event reporting.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod pairing;
pub mod playback;
pub mod playlist;
pub mod reporter;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
