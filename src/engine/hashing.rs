//! Content hashing utilities

use blake3::Hasher;

/// blake3 of the content bytes, lowercase hex.
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}
