//! Code identifiers and random hash codes.
//!
//! Most Stockor records carry a short uppercase `code` (e.g. `CASH`, `AMAZON`)
//! that is derived from the record's name when none is given.

use uuid::Uuid;

/// Default width of a derived code.
pub const DEFAULT_CODE_LENGTH: usize = 10;

/// Derive a code from a human name: uppercase ASCII alphanumerics, truncated.
///
/// Returns an empty string when the name has no usable characters; callers
/// validate presence.
pub fn from_name(name: &str, max_len: usize) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(max_len)
        .collect()
}

/// Normalize a user supplied code the same way (trimmed, uppercased).
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Random 12 hex-char code used for public links (order lookups, etc.).
pub fn random_hash_code() -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(12);
    s
}
