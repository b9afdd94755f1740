//! # Vitrine Common Library
//!
//! Shared code for the Vitrine signage kiosk including:
//! - Domain model (slot kinds, slot content, playback records, news items)
//! - Event types (KioskEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - Database initialization
//! - Identifier and timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
