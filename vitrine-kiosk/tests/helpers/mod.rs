//! Test helper modules for vitrine-kiosk integration tests
//!
//! Provides in-memory stand-ins for every external collaborator:
//! - FakeBackend: content, telemetry, and pairing APIs
//! - FakeRenderer: records presentations, injects failures
//! - ImmediateClock: records requested waits and returns at once
//! - Harness: a scheduler wired to all of the above

#![allow(dead_code)]

pub mod fake_backend;
pub mod fake_renderer;
pub mod harness;

pub use fake_backend::FakeBackend;
pub use fake_renderer::{FakeRenderer, ImmediateClock, VideoEnd};
pub use harness::{
    anonymous_feed_row, feed_row, image_row, new_id, record_for, video_row, Harness, PlaylistHandle,
    TERMINAL_ID,
};
