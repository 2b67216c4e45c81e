//! Content fingerprints.
//!
//! SHA-256 over the JSON serialization of a value. Used to fingerprint outbox
//! writes and to log what a pass stored without dumping whole bodies.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of a serializable value.
///
/// # Panics
///
/// Panics if the value cannot be serialized to JSON. Every type hashed in
/// this crate is a plain struct of strings and integers.
#[must_use]
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).expect("serialization should not fail");
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short form of a digest for log lines.
#[must_use]
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
