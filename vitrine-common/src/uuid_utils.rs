//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

/// Whether `s` is a well-formed hyphenated UUID.
///
/// Backend identifiers are always emitted in the canonical 36-character
/// hyphenated form; braced, URN, and simple forms are rejected.
pub fn is_well_formed(s: &str) -> bool {
    s.len() == 36 && Uuid::parse_str(s).is_ok()
}
