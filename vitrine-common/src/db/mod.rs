//! Database initialization shared by the kiosk binary and tests

pub mod init;

pub use init::{init_database, init_memory_database};
