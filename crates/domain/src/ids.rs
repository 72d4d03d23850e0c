//! Short hex identifiers for sessions, findings, and leads.

use uuid::Uuid;

/// Generate a short lowercase-hex id of `len` characters (max 32).
pub fn short_id(len: usize) -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(len.min(32));
    s
}

/// 8-char id used for findings and leads.
pub fn finding_id() -> String {
    short_id(8)
}

/// 12-char id used for sessions and investigations.
pub fn session_id() -> String {
    short_id(12)
}
