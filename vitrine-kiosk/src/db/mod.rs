//! Database access layer
//!
//! Provides queries for runtime settings and the playback log queue.

pub mod playback_log;
pub mod settings;
