//! Playlist content supplied to the scheduler

pub mod sync;

pub use sync::{PlaylistSnapshot, PlaylistSync};
