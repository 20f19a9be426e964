// hasher.rs — SHA-256 hashing for the event chain.
//
// All hashes are SHA-256, lowercase hex. An event's hash covers its full
// JSON form, including `previous_hash`, so rewriting any earlier event
// breaks every later link.

use sha2::{Digest, Sha256};

use crate::event::Event;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash an event's canonical JSON form.
///
/// Struct fields serialize in declaration order and `serde_json::Value`
/// objects keep sorted keys, so the same event always hashes the same,
/// including after a round trip through the store.
pub fn hash_event(event: &Event) -> Result<String, serde_json::Error> {
    Ok(hash_str(&serde_json::to_string(event)?))
}
